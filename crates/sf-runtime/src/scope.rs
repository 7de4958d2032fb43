use serde_json::Value;
use sf_core::{lookup_path, parse_path, ValueMap};

/// Stack depth recorded before a frame was pushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeMark(usize);

#[derive(Debug, Clone, Default)]
struct Frame {
    vars: ValueMap,
    /// Seeded from an action descriptor's own fields.
    action: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ScopeStack {
    frames: Vec<Frame>,
}

impl ScopeStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_scope(&mut self, initial: ValueMap) -> ScopeMark {
        self.push(initial, false)
    }

    /// Pushes the frame an action runs in. While it is the innermost frame,
    /// lookups pass over it, so the action's fields resolve against the
    /// bindings around it rather than against their own raw templates.
    /// Frames pushed on top of it see it as usual.
    pub fn create_action_scope(&mut self, fields: ValueMap) -> ScopeMark {
        self.push(fields, true)
    }

    fn push(&mut self, vars: ValueMap, action: bool) -> ScopeMark {
        let mark = ScopeMark(self.frames.len());
        self.frames.push(Frame { vars, action });
        mark
    }

    pub fn set_variable(&mut self, name: &str, value: Value) {
        if self.frames.is_empty() {
            self.push(ValueMap::new(), false);
        }
        if let Some(frame) = self.frames.last_mut() {
            frame.vars.insert(name.to_string(), value);
        }
    }

    /// The root segment is searched innermost first; the remaining segments
    /// descend into whatever value that frame holds.
    pub fn find_variable(&self, path: &str) -> Option<&Value> {
        let parts = parse_path(path);
        let (root, rest) = parts.split_first()?;
        let skip = usize::from(self.frames.last().is_some_and(|frame| frame.action));
        let frame = self
            .frames
            .iter()
            .rev()
            .skip(skip)
            .find(|frame| frame.vars.contains_key(root.as_str()))?;
        lookup_path(frame.vars.get(root.as_str())?, rest)
    }

    pub fn clear_scope(&mut self) {
        self.frames.pop();
    }

    /// Pops every frame pushed since `mark`, including frames leaked by a
    /// failing body.
    pub fn restore(&mut self, mark: ScopeMark) {
        self.frames.truncate(mark.0);
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}
