//! spec.md §8 scenario 6: a handler that already holds the screen monitor
//! must see `DeadlockPrevented` (not a hang) if something on the same call
//! stack tries to lock it again — exercised here against the actual shared
//! [`kestrel_screen::ComponentTree`] `kestrel_bin::server::build` wires
//! across every screen endpoint, not a tree built by hand for the test.

use kestrel_bin::server;
use kestrel_config::KestrelConfig;
use kestrel_screen::ScreenError;

#[test]
fn reentering_the_shared_tree_from_within_a_handler_reports_deadlock_prevented() {
	let app = server::build(&KestrelConfig::default());

	let outer = app.tree.with_tree(|_root| {
		// Stands in for a handler that, while still holding the monitor,
		// synchronously calls into another endpoint wired onto the same
		// tree (e.g. a second `/screen/manager` connection's handler).
		let inner = app.tree.with_tree(|_root| ());
		assert!(matches!(inner, Err(ScreenError::DeadlockPrevented)));
	});

	assert!(outer.is_ok(), "the outer call must still complete once the inner one backs off");

	// The monitor is free again afterwards: unrelated later calls are not
	// left permanently locked out by the prevented reentrance.
	assert!(app.tree.with_tree(|_root| ()).is_ok());
}
