//! Consumer-side models fed by broadcast events.
//!
//! Every model applies events in arrival order. Nothing is merged or
//! reconciled: if two peers clear and draw at once, whichever frame arrives
//! last wins locally.

use std::collections::VecDeque;

use crate::events::{BroadcastEvent, ChatLine, Shape, Stroke};

/// Strokes and shapes on a shared board.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Whiteboard {
    strokes: Vec<Stroke>,
    shapes: Vec<Shape>,
}

impl Whiteboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_stroke(&mut self, stroke: Stroke) {
        self.strokes.push(stroke);
    }

    pub fn add_shape(&mut self, shape: Shape) {
        self.shapes.push(shape);
    }

    pub fn clear(&mut self) {
        self.strokes.clear();
        self.shapes.clear();
    }

    pub fn strokes(&self) -> &[Stroke] {
        &self.strokes
    }

    pub fn shapes(&self) -> &[Shape] {
        &self.shapes
    }

    pub fn is_empty(&self) -> bool {
        self.strokes.is_empty() && self.shapes.is_empty()
    }
}

/// Append-only chat history, capped at `capacity` lines.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatLog {
    lines: VecDeque<ChatLine>,
    capacity: usize,
}

impl ChatLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity.min(64)),
            capacity,
        }
    }

    /// Append a line. The same id twice is kept twice.
    pub fn push(&mut self, line: ChatLine) {
        if self.capacity == 0 {
            return;
        }
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    /// Oldest first.
    pub fn lines(&self) -> &VecDeque<ChatLine> {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

impl Default for ChatLog {
    fn default() -> Self {
        Self::new(500)
    }
}

/// An achievement someone in the room unlocked.
#[derive(Debug, Clone, PartialEq)]
pub struct UnlockedAchievement {
    pub user_id: String,
    pub achievement_id: String,
    pub title: String,
}

/// Everything a live session room renders.
#[derive(Debug, Clone, Default)]
pub struct RoomModel {
    pub board: Whiteboard,
    pub chat: ChatLog,
    pub unlocked: Vec<UnlockedAchievement>,
    ignored: u64,
}

impl RoomModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one event. Returns `false` when it changed nothing.
    pub fn apply(&mut self, event: &BroadcastEvent) -> bool {
        match event {
            BroadcastEvent::PathDrawn { stroke } => self.board.add_stroke(stroke.clone()),
            BroadcastEvent::ShapeAdded { shape } => self.board.add_shape(shape.clone()),
            BroadcastEvent::Cleared => self.board.clear(),
            BroadcastEvent::ChatMessage { line } => self.chat.push(line.clone()),
            BroadcastEvent::AchievementUnlocked {
                user_id,
                achievement_id,
                title,
            } => self.unlocked.push(UnlockedAchievement {
                user_id: user_id.clone(),
                achievement_id: achievement_id.clone(),
                title: title.clone(),
            }),
            BroadcastEvent::Unknown => {
                self.ignored += 1;
                log::debug!("Ignoring unknown room event");
                return false;
            }
        }
        true
    }

    /// Decode and apply a raw payload. Undecodable input changes nothing.
    pub fn apply_payload(&mut self, payload: &[u8]) -> bool {
        match BroadcastEvent::decode(payload) {
            Ok(event) => self.apply(&event),
            Err(e) => {
                self.ignored += 1;
                log::debug!("Ignoring undecodable room payload: {e}");
                false
            }
        }
    }

    /// Events that did not apply.
    pub fn ignored(&self) -> u64 {
        self.ignored
    }
}
