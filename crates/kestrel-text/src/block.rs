/// Errors returned by [`TextBlock`] mutation, all of which indicate a caller
/// addressed a line index outside `[0, last_line()]`.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TextBlockError {
	#[error("line index {0} out of bounds (last line is {1})")]
	OutOfBounds(u64, u64),
}

/// Line-indexed, mutable text storage.
///
/// Lines are dense over `[0, last_line()]`; a brand-new block has exactly
/// one empty line, matching spec.md §3's invariant for an empty file.
#[derive(Debug, Clone, Default)]
pub struct TextBlock {
	lines: Vec<String>,
}

impl TextBlock {
	pub fn new() -> Self {
		TextBlock { lines: vec![String::new()] }
	}

	pub fn from_lines(lines: Vec<String>) -> Self {
		if lines.is_empty() { TextBlock::new() } else { TextBlock { lines } }
	}

	pub fn last_line(&self) -> u64 {
		(self.lines.len() - 1) as u64
	}

	pub fn get_line(&self, index: u64) -> Result<&str, TextBlockError> {
		self.lines.get(index as usize).map(String::as_str).ok_or(TextBlockError::OutOfBounds(index, self.last_line()))
	}

	/// Calls `f` with exactly `min(count, last_line - from + 1)` borrowed
	/// lines, in order.
	pub fn visit(&self, from: u64, count: u64, mut f: impl FnMut(u64, &str)) {
		let start = from as usize;
		let end = (start + count as usize).min(self.lines.len());
		for (offset, line) in self.lines[start.min(self.lines.len())..end].iter().enumerate() {
			f(from + offset as u64, line);
		}
	}

	pub fn set_line(&mut self, index: u64, content: impl Into<String>) -> Result<(), TextBlockError> {
		let last = self.last_line();
		let slot = self.lines.get_mut(index as usize).ok_or(TextBlockError::OutOfBounds(index, last))?;
		*slot = content.into();
		Ok(())
	}

	/// Inserts a new line at `index`, shifting lines at and after `index`
	/// down by one. `index == lines.len()` appends.
	pub fn insert_line(&mut self, index: u64, content: impl Into<String>) -> Result<(), TextBlockError> {
		if index as usize > self.lines.len() {
			return Err(TextBlockError::OutOfBounds(index, self.last_line()));
		}
		self.lines.insert(index as usize, content.into());
		Ok(())
	}

	/// Removes the line at `index`. Erasing the last remaining line leaves a
	/// single empty line, preserving the "empty file has one empty line"
	/// invariant.
	pub fn erase_line(&mut self, index: u64) -> Result<(), TextBlockError> {
		let last = self.last_line();
		if index > last {
			return Err(TextBlockError::OutOfBounds(index, last));
		}
		self.lines.remove(index as usize);
		if self.lines.is_empty() {
			self.lines.push(String::new());
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn blank_block_has_one_empty_line() {
		let block = TextBlock::new();
		assert_eq!(block.last_line(), 0);
		assert_eq!(block.get_line(0).unwrap(), "");
	}

	#[test]
	fn erase_last_line_leaves_one_empty_line() {
		let mut block = TextBlock::from_lines(vec!["only".into()]);
		block.erase_line(0).unwrap();
		assert_eq!(block.last_line(), 0);
		assert_eq!(block.get_line(0).unwrap(), "");
	}

	#[test]
	fn visit_yields_min_of_count_and_remaining() {
		let block = TextBlock::from_lines(vec!["a".into(), "b".into(), "c".into()]);
		let mut seen = Vec::new();
		block.visit(1, 10, |i, line| seen.push((i, line.to_string())));
		assert_eq!(seen, vec![(1, "b".to_string()), (2, "c".to_string())]);
	}

	#[test]
	fn out_of_bounds_set_line_errors() {
		let mut block = TextBlock::new();
		assert_eq!(block.set_line(5, "x"), Err(TextBlockError::OutOfBounds(5, 0)));
	}

	#[test]
	fn insert_line_shifts_tail_down() {
		let mut block = TextBlock::from_lines(vec!["a".into(), "b".into()]);
		block.insert_line(1, "mid").unwrap();
		assert_eq!(block.get_line(0).unwrap(), "a");
		assert_eq!(block.get_line(1).unwrap(), "mid");
		assert_eq!(block.get_line(2).unwrap(), "b");
	}
}
