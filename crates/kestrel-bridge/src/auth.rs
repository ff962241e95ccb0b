use crate::acl::Principal;

/// A challenge/response authenticator, per spec.md §6's handshake:
/// `login(user) -> (nonce, key_id)`, then `respond(user, nonce, key_id,
/// response) -> Option<Principal>` on the computed response.
///
/// `response` stands in for the spec's raw bytes; this workspace carries
/// it as a `String` since [`kestrel_value::Value`] has no byte-string
/// variant — callers that need binary challenge material can hex- or
/// base64-encode it into the string.
pub trait Authenticator {
	fn login(&self, user: &str) -> (String, String);
	fn respond(&self, user: &str, nonce: &str, key_id: &str, response: &str) -> Option<Principal>;
}

/// An authenticator that accepts any response matching a fixed shared
/// secret, mostly useful for tests and single-user local setups.
pub struct SharedSecretAuthenticator {
	secret: String,
}

impl SharedSecretAuthenticator {
	pub fn new(secret: impl Into<String>) -> Self {
		SharedSecretAuthenticator { secret: secret.into() }
	}
}

impl Authenticator for SharedSecretAuthenticator {
	fn login(&self, user: &str) -> (String, String) {
		(format!("nonce-for-{user}"), "shared".to_string())
	}

	fn respond(&self, user: &str, _nonce: &str, _key_id: &str, response: &str) -> Option<Principal> {
		if response == self.secret { Some(Principal::unrestricted(user)) } else { None }
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn correct_secret_yields_a_principal() {
		let auth = SharedSecretAuthenticator::new("swordfish");
		let (nonce, key_id) = auth.login("alice");
		assert!(!nonce.is_empty());
		assert!(!key_id.is_empty());
		let principal = auth.respond("alice", &nonce, &key_id, "swordfish").unwrap();
		assert_eq!(principal.name, "alice");
	}

	#[test]
	fn wrong_secret_is_rejected() {
		let auth = SharedSecretAuthenticator::new("swordfish");
		let (nonce, key_id) = auth.login("alice");
		assert!(auth.respond("alice", &nonce, &key_id, "wrong").is_none());
	}
}
