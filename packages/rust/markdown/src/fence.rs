//! Fenced code block tracking shared by the line scanners.

/// Tracks whether a line-by-line scan is inside a fenced code block.
#[derive(Debug, Default, Clone)]
pub struct FenceTracker {
    open: Option<(char, usize)>,
}

impl FenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next line. Returns `true` when the line is a fence
    /// delimiter or lies inside a fenced block.
    pub fn observe(&mut self, line: &str) -> bool {
        let fence = fence_run(line);
        match (self.open, fence) {
            (None, Some(run)) => {
                self.open = Some(run);
                true
            }
            (Some((ch, len)), Some((c, n))) if c == ch && n >= len && is_closing(line) => {
                self.open = None;
                true
            }
            (Some(_), _) => true,
            (None, None) => false,
        }
    }

    pub fn in_fence(&self) -> bool {
        self.open.is_some()
    }

    /// Delimiter line that would close the open fence.
    pub fn closing(&self) -> Option<String> {
        self.open.map(|(ch, len)| ch.to_string().repeat(len))
    }
}

fn fence_run(line: &str) -> Option<(char, usize)> {
    let trimmed = line.trim_start();
    if line.len() - trimmed.len() > 3 {
        return None;
    }
    let ch = trimmed.chars().next()?;
    if ch != '`' && ch != '~' {
        return None;
    }
    let len = trimmed.chars().take_while(|&c| c == ch).count();
    (len >= 3).then_some((ch, len))
}

/// A closing fence carries no info string.
fn is_closing(line: &str) -> bool {
    let trimmed = line.trim();
    let ch = trimmed.chars().next().unwrap_or('`');
    trimmed.chars().all(|c| c == ch)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_backtick_fences() {
        let mut fence = FenceTracker::new();
        let flags: Vec<bool> = ["text", "```rust", "let x = 1;", "```", "after"]
            .iter()
            .map(|l| fence.observe(l))
            .collect();
        assert_eq!(flags, vec![false, true, true, true, false]);
        assert!(!fence.in_fence());
    }

    #[test]
    fn shorter_or_different_fence_does_not_close() {
        let mut fence = FenceTracker::new();
        fence.observe("````");
        assert!(fence.observe("```"));
        assert!(fence.observe("~~~~"));
        assert!(fence.in_fence());
        fence.observe("````");
        assert!(!fence.in_fence());
    }

    #[test]
    fn closing_matches_the_opening_run() {
        let mut fence = FenceTracker::new();
        assert_eq!(fence.closing(), None);
        fence.observe("~~~~ text");
        assert_eq!(fence.closing().as_deref(), Some("~~~~"));
    }
}
