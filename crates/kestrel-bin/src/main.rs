use clap::Parser;
use kestrel_bin::cli::Cli;
use kestrel_bin::server;
use kestrel_config::KestrelConfig;
use kestrel_pipe::ContextManager;
use std::rc::Rc;
use tokio::task::LocalSet;

#[tokio::main(flavor = "current_thread")]
async fn main() {
	tracing_subscriber::fmt::init();

	let cli = Cli::parse();
	let config = KestrelConfig { bind: cli.bind, ..KestrelConfig::default() };

	LocalSet::new()
		.run_until(async move {
			let manager = ContextManager::new();
			let app = server::build(&config);
			server::bootstrap_admin(&app, &manager, &cli.secret).await;

			let serve = async {
				match config.bind {
					Some(addr) => {
						if let Err(err) = server::serve_bridge(&app, Rc::new(manager), addr, config.response_timeout).await {
							tracing::error!(%err, "bridge listener exited with an error");
							std::process::exit(1);
						}
					}
					None => {
						tracing::info!("no --bind given, serving local pipes only until /editor/shutdown");
						app.lifetime.cancelled().await;
					}
				}
			};

			tokio::select! {
				() = serve => {}
				_ = tokio::signal::ctrl_c() => {
					tracing::info!("received ctrl-c, shutting down");
					app.lifetime.cancel();
				}
			}
		})
		.await;
}
