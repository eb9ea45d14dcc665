//! The active flag of a button is owned outside the coordinator. The
//! coordinator only emits [`ActivationRequest`]s; whoever owns the flag decides
//! and feeds the result back through `set_active`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier supplied by the embedder for one button.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ButtonId(String);

impl ButtonId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ButtonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "request", content = "id", rename_all = "snake_case")]
pub enum ActivationRequest {
    /// The user asked this button to start playing.
    Play(ButtonId),
    /// The user asked to stop, or the clip reached its end.
    Stop(ButtonId),
}

impl ActivationRequest {
    pub fn id(&self) -> &ButtonId {
        match self {
            ActivationRequest::Play(id) | ActivationRequest::Stop(id) => id,
        }
    }
}

/// New value of one button's active flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagChange {
    pub id: ButtonId,
    pub active: bool,
}

/// Flag owner for a group of buttons where at most one plays at a time.
/// Granting play to a button deactivates the previous one.
#[derive(Debug, Default)]
pub struct ExclusivePlayback {
    active: Option<ButtonId>,
}

impl ExclusivePlayback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> Option<&ButtonId> {
        self.active.as_ref()
    }

    pub fn is_active(&self, id: &ButtonId) -> bool {
        self.active.as_ref() == Some(id)
    }

    /// Decides a request and returns the flag changes to deliver, in order.
    pub fn apply(&mut self, request: &ActivationRequest) -> Vec<FlagChange> {
        match request {
            ActivationRequest::Play(id) => {
                if self.is_active(id) {
                    return Vec::new();
                }
                let mut changes = Vec::new();
                if let Some(previous) = self.active.replace(id.clone()) {
                    changes.push(FlagChange {
                        id: previous,
                        active: false,
                    });
                }
                changes.push(FlagChange {
                    id: id.clone(),
                    active: true,
                });
                changes
            }
            ActivationRequest::Stop(id) => {
                if !self.is_active(id) {
                    return Vec::new();
                }
                self.active = None;
                vec![FlagChange {
                    id: id.clone(),
                    active: false,
                }]
            }
        }
    }
}
