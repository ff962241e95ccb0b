/// Abstracts over wherever `/document/manager`'s `open`/`save` actually
/// read and write bytes, per spec.md §6's "process I/O" note that the
/// mechanism backing a document's upstream is left to the host.
pub trait Upstream {
	fn read(&self, uri: &str) -> Result<String, String>;
	fn write(&self, uri: &str, contents: &str) -> Result<(), String>;
}

/// The default [`Upstream`], backed directly by the local filesystem.
///
/// Uses blocking `std::fs` calls rather than `tokio::fs`: spec.md §5
/// describes context threads as never blocking on I/O, so this is a known
/// simplification rather than the intended final shape — see DESIGN.md.
pub struct FilesystemUpstream;

impl Upstream for FilesystemUpstream {
	fn read(&self, uri: &str) -> Result<String, String> {
		std::fs::read_to_string(uri).map_err(|err| err.to_string())
	}

	fn write(&self, uri: &str, contents: &str) -> Result<(), String> {
		std::fs::write(uri, contents).map_err(|err| err.to_string())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn round_trips_through_a_temp_file() {
		let dir = std::env::temp_dir();
		let path = dir.join(format!("kestrel-services-upstream-test-{:?}", std::thread::current().id()));
		let path = path.to_str().unwrap().to_string();
		let upstream = FilesystemUpstream;
		upstream.write(&path, "hello").unwrap();
		assert_eq!(upstream.read(&path).unwrap(), "hello");
		let _ = std::fs::remove_file(&path);
	}

	#[test]
	fn reading_a_missing_file_fails() {
		let upstream = FilesystemUpstream;
		assert!(upstream.read("/no/such/path/kestrel-services").is_err());
	}
}
