/// A whitelist of absolute service-path prefixes a principal may reach,
/// per spec.md §4.11/§6. `allow_all` stands in for an unauthenticated or
/// unrestricted session.
#[derive(Debug, Clone)]
pub struct Acl(Vec<String>);

impl Acl {
	pub fn allow_all() -> Self {
		Acl(vec!["/".to_string()])
	}

	pub fn whitelist(paths: impl IntoIterator<Item = impl Into<String>>) -> Self {
		Acl(paths.into_iter().map(Into::into).collect())
	}

	pub fn allows(&self, path: &str) -> bool {
		self.0.iter().any(|prefix| prefix == "/" || path == prefix || path.starts_with(&format!("{prefix}/")))
	}
}

/// The principal attached to a session once the auth handshake succeeds,
/// per spec.md §4.11.
#[derive(Debug, Clone)]
pub struct Principal {
	pub name: String,
	pub access: Acl,
	pub modify: Acl,
}

impl Principal {
	pub fn unrestricted(name: impl Into<String>) -> Self {
		Principal { name: name.into(), access: Acl::allow_all(), modify: Acl::allow_all() }
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn whitelist_allows_the_listed_prefix_and_its_children() {
		let acl = Acl::whitelist(["/document"]);
		assert!(acl.allows("/document"));
		assert!(acl.allows("/document/cursor"));
		assert!(!acl.allows("/screen/manager"));
	}

	#[test]
	fn whitelist_does_not_allow_a_sibling_with_shared_prefix_text() {
		let acl = Acl::whitelist(["/document"]);
		assert!(!acl.allows("/documents"));
	}

	#[test]
	fn allow_all_allows_everything() {
		let acl = Acl::allow_all();
		assert!(acl.allows("/anything/at/all"));
	}
}
