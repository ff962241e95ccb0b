use crate::error::ScreenError;

/// One segment of a parsed [`ComponentPath`], per spec.md §4.12: `"/0/1/self"`
/// traverses child 0 of the root, child 1 of that, then the container-self
/// sentinel; `"/0/1/3"` addresses window 3 of the container at `/0/1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
	Index(usize),
	SelfSentinel,
}

/// A parsed, normalized component-tree path. `".."` segments are collapsed
/// against the preceding segment during parsing (so `"/0/.."` normalizes
/// to the root), matching spec.md §8's path-addressing invariant that
/// `"/x"` followed by `"/x/.."` returns the root.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ComponentPath(pub Vec<Segment>);

impl ComponentPath {
	pub fn root() -> Self {
		ComponentPath(Vec::new())
	}

	pub fn parse(path: &str) -> Result<Self, ScreenError> {
		let mut segments: Vec<Segment> = Vec::new();
		for part in path.split('/').filter(|p| !p.is_empty()) {
			match part {
				".." => {
					if segments.pop().is_none() {
						return Err(ScreenError::PathNotFound(path.to_string()));
					}
				}
				"self" => segments.push(Segment::SelfSentinel),
				index => {
					let parsed = index.parse::<usize>().map_err(|_| ScreenError::PathNotFound(path.to_string()))?;
					segments.push(Segment::Index(parsed));
				}
			}
		}
		if segments.iter().enumerate().any(|(i, s)| matches!(s, Segment::SelfSentinel) && i + 1 != segments.len()) {
			return Err(ScreenError::PathNotFound(path.to_string()));
		}
		Ok(ComponentPath(segments))
	}

	pub fn segments(&self) -> &[Segment] {
		&self.0
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn root_path_is_empty() {
		assert_eq!(ComponentPath::parse("/").unwrap(), ComponentPath::root());
	}

	#[test]
	fn numeric_segments_parse_in_order() {
		let path = ComponentPath::parse("/0/1/3").unwrap();
		assert_eq!(path.segments(), &[Segment::Index(0), Segment::Index(1), Segment::Index(3)]);
	}

	#[test]
	fn self_sentinel_must_be_last() {
		assert!(ComponentPath::parse("/0/self/1").is_err());
		assert!(ComponentPath::parse("/0/1/self").is_ok());
	}

	#[test]
	fn parent_segment_collapses_against_the_previous_one() {
		let path = ComponentPath::parse("/0/..").unwrap();
		assert_eq!(path, ComponentPath::root());
	}

	#[test]
	fn parent_segment_past_the_root_is_path_not_found() {
		assert!(ComponentPath::parse("/..").is_err());
	}

	#[test]
	fn malformed_segment_is_path_not_found() {
		assert!(ComponentPath::parse("/not-a-number").is_err());
	}
}
