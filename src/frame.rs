//! Binding frames: the variable environments built up during matching.
//!
//! A [`Frame`] is a partial map from a rule's variables to concrete values,
//! append-only: binding an already-bound variable to a conflicting value
//! does not mutate the frame, it invalidates the attempt. A [`FrameSet`] is
//! the ordered collection of all frames simultaneously viable at a point in
//! rule evaluation — the disjunction of candidate worlds.
//!
//! Variables are indexed per rule ([`VarId`] is an offset into the rule's
//! declared variable list), so a frame is a dense slot vector rather than a
//! string-keyed map.

use serde_json::Value;

/// Index of a variable within one rule's declared variable set.
///
/// Scoped to a single rule evaluation; never shared across rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub u16);

impl VarId {
    /// Offset into the rule's variable list.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// One consistent binding environment.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    slots: Vec<Option<Value>>,
}

impl Frame {
    /// Create an empty frame for a rule declaring `var_count` variables.
    pub fn new(var_count: usize) -> Self {
        Self {
            slots: vec![None; var_count],
        }
    }

    /// The bound value of a variable, if any.
    pub fn get(&self, var: VarId) -> Option<&Value> {
        self.slots.get(var.index()).and_then(|s| s.as_ref())
    }

    /// Whether the variable is bound.
    pub fn is_bound(&self, var: VarId) -> bool {
        self.get(var).is_some()
    }

    /// Bind `var` to `value`, enforcing consistency.
    ///
    /// Returns `true` if the binding succeeded (the variable was unbound, or
    /// already bound to an equal value) and `false` on conflict. A `false`
    /// return means the caller must discard this frame; the frame itself is
    /// left untouched.
    #[must_use]
    pub fn bind(&mut self, var: VarId, value: &Value) -> bool {
        match &self.slots[var.index()] {
            Some(existing) => existing == value,
            None => {
                self.slots[var.index()] = Some(value.clone());
                true
            }
        }
    }

    /// Number of bound variables.
    pub fn bound_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }
}

/// Ordered collection of viable frames.
///
/// Empty means "no viable bindings" — the rule does not fire. A set holding
/// one empty frame means "one viable binding: none needed".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameSet {
    frames: Vec<Frame>,
}

impl FrameSet {
    /// The empty set: no viable bindings.
    pub fn empty() -> Self {
        Self { frames: Vec::new() }
    }

    /// The unit set: a single fresh frame for `var_count` variables.
    pub fn unit(var_count: usize) -> Self {
        Self {
            frames: vec![Frame::new(var_count)],
        }
    }

    /// Build from an explicit frame list, preserving order.
    pub fn from_frames(frames: Vec<Frame>) -> Self {
        Self { frames }
    }

    /// Number of viable frames.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Whether no frame survives.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Iterate over the frames in order.
    pub fn iter(&self) -> impl Iterator<Item = &Frame> {
        self.frames.iter()
    }

    /// Consume into the underlying frames.
    pub fn into_frames(self) -> Vec<Frame> {
        self.frames
    }

    /// Keep only frames satisfying the predicate.
    pub fn retain(&mut self, mut pred: impl FnMut(&Frame) -> bool) {
        self.frames.retain(|f| pred(f));
    }

    /// Append a frame.
    pub fn push(&mut self, frame: Frame) {
        self.frames.push(frame);
    }
}

impl IntoIterator for FrameSet {
    type Item = Frame;
    type IntoIter = std::vec::IntoIter<Frame>;

    fn into_iter(self) -> Self::IntoIter {
        self.frames.into_iter()
    }
}
