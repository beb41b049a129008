//! Placeholder slots
//!
//! A native macro sometimes needs to change output it already produced: the
//! label tracker wraps an earlier label target once a reference to it is seen.
//! The macro emits an inert placeholder for a slot instead of the text itself
//! and keeps the slot id; the slot content can be replaced any number of times
//! until the expansion finishes, when every placeholder is swapped for its
//! final content.

const PREFIX: &str = "@@SLOT-";
const SUFFIX: &str = "@@";

/// Nested placeholders deeper than this are left unresolved
const MAX_DEPTH: usize = 32;

/// Identifies one slot within a document pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId(usize);

impl SlotId {
    /// The placeholder text standing in for this slot
    pub fn placeholder(self) -> String {
        format!("{PREFIX}{}{SUFFIX}", self.0)
    }
}

/// Storage for slot contents
#[derive(Debug, Default)]
pub struct SlotArena {
    contents: Vec<String>,
}

impl SlotArena {
    /// Allocates a slot holding `content`
    pub fn alloc(&mut self, content: impl Into<String>) -> SlotId {
        self.contents.push(content.into());
        SlotId(self.contents.len() - 1)
    }

    /// Returns the current content of a slot
    pub fn get(&self, id: SlotId) -> Option<&str> {
        self.contents.get(id.0).map(String::as_str)
    }

    /// Replaces the content of a slot. Returns false for an unknown id.
    pub fn set(&mut self, id: SlotId, content: impl Into<String>) -> bool {
        match self.contents.get_mut(id.0) {
            Some(slot) => {
                *slot = content.into();
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.contents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contents.is_empty()
    }

    /// Replaces placeholders in `text` with slot contents, recursively
    pub fn resolve(&self, text: &str) -> String {
        self.resolve_at(text, 0)
    }

    fn resolve_at(&self, text: &str, depth: usize) -> String {
        if self.contents.is_empty() || depth > MAX_DEPTH || !text.contains(PREFIX) {
            return text.to_string();
        }

        let mut out = String::with_capacity(text.len());
        let mut rest = text;

        while let Some(start) = rest.find(PREFIX) {
            out.push_str(&rest[..start]);
            let after = &rest[start + PREFIX.len()..];

            let digits = after.bytes().take_while(u8::is_ascii_digit).count();
            let content = after[..digits]
                .parse::<usize>()
                .ok()
                .filter(|_| after[digits..].starts_with(SUFFIX))
                .and_then(|index| self.contents.get(index));

            match content {
                Some(content) => {
                    out.push_str(&self.resolve_at(content, depth + 1));
                    rest = &after[digits + SUFFIX.len()..];
                }
                None => {
                    out.push_str(PREFIX);
                    rest = after;
                }
            }
        }

        out.push_str(rest);
        out
    }
}
