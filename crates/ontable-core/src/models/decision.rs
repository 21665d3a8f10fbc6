//! Decision model

use serde::{Deserialize, Serialize};

use super::id::uuid_id;
use super::option::{DecisionOption, OptionId};
use crate::error::{Error, Result};

uuid_id!(
    /// A unique identifier for a decision, using UUID v7 (time-sortable)
    DecisionId
);

/// Whether a decision has been settled, and on what
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Resolution {
    #[default]
    Unresolved,
    Resolved {
        option_id: OptionId,
        /// Resolution timestamp (Unix ms)
        resolved_at: i64,
    },
}

/// The comparison document: a title and the options being weighed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    /// Unique identifier
    pub id: DecisionId,
    /// Free text, may be empty
    pub title: String,
    /// Ordered options; never empty
    pub options: Vec<DecisionOption>,
    #[serde(default)]
    pub resolution: Resolution,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last update timestamp (Unix ms)
    pub updated_at: i64,
}

impl Decision {
    /// Create a decision from option titles.
    ///
    /// Fails when no option is given. A single option resolves immediately.
    pub fn new<I, S>(title: impl Into<String>, option_titles: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let options = option_titles
            .into_iter()
            .map(DecisionOption::new)
            .collect();
        Self::with_options(title, options)
    }

    /// Create a decision from fully built options.
    pub fn with_options(title: impl Into<String>, options: Vec<DecisionOption>) -> Result<Self> {
        if options.is_empty() {
            return Err(Error::InvalidInput(
                "a decision needs at least one option".into(),
            ));
        }

        let now = chrono::Utc::now().timestamp_millis();
        let mut decision = Self {
            id: DecisionId::new(),
            title: title.into(),
            options,
            resolution: Resolution::Unresolved,
            created_at: now,
            updated_at: now,
        };
        decision.normalize();
        Ok(decision)
    }

    /// A decision received from elsewhere must carry at least one option.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        !self.options.is_empty()
    }

    #[must_use]
    pub const fn is_resolved(&self) -> bool {
        matches!(self.resolution, Resolution::Resolved { .. })
    }

    /// The option the decision was resolved to, if any
    #[must_use]
    pub fn chosen_option(&self) -> Option<&DecisionOption> {
        match self.resolution {
            Resolution::Resolved { option_id, .. } => self.option(&option_id),
            Resolution::Unresolved => None,
        }
    }

    #[must_use]
    pub fn option(&self, id: &OptionId) -> Option<&DecisionOption> {
        self.options.iter().find(|option| &option.id == id)
    }

    pub fn option_mut(&mut self, id: &OptionId) -> Option<&mut DecisionOption> {
        self.options.iter_mut().find(|option| &option.id == id)
    }

    #[must_use]
    pub fn has_option(&self, id: &OptionId) -> bool {
        self.option(id).is_some()
    }

    /// Find an option by id, id suffix, or case-insensitive title
    #[must_use]
    pub fn find_option(&self, needle: &str) -> Option<&DecisionOption> {
        let needle = needle.trim();
        if needle.is_empty() {
            return None;
        }
        self.options
            .iter()
            .find(|option| option.id.as_str() == needle || option.id.short() == needle)
            .or_else(|| {
                self.options
                    .iter()
                    .find(|option| option.title.eq_ignore_ascii_case(needle))
            })
    }

    pub fn rename(&mut self, title: impl Into<String>) {
        self.title = title.into();
        self.touch();
    }

    pub fn add_option(&mut self, option: DecisionOption) -> OptionId {
        let id = option.id;
        self.options.push(option);
        self.touch();
        id
    }

    /// Remove an option. The last remaining option cannot be removed.
    pub fn remove_option(&mut self, id: &OptionId) -> Result<DecisionOption> {
        let index = self
            .options
            .iter()
            .position(|option| &option.id == id)
            .ok_or_else(|| Error::NotFound(format!("option {id}")))?;
        if self.options.len() == 1 {
            return Err(Error::InvalidInput(
                "cannot remove the only option of a decision".into(),
            ));
        }

        let removed = self.options.remove(index);
        self.touch();
        self.normalize();
        Ok(removed)
    }

    /// Settle the decision on one of its options
    pub fn resolve(&mut self, id: &OptionId) -> Result<()> {
        if !self.has_option(id) {
            return Err(Error::NotFound(format!("option {id}")));
        }
        self.resolution = Resolution::Resolved {
            option_id: *id,
            resolved_at: chrono::Utc::now().timestamp_millis(),
        };
        self.touch();
        Ok(())
    }

    /// Clear the resolution. Has no lasting effect on single-option decisions.
    pub fn reopen(&mut self) {
        self.resolution = Resolution::Unresolved;
        self.touch();
        self.normalize();
    }

    /// Re-establish the resolution invariants.
    ///
    /// A resolution must point at an existing option, and a decision with a
    /// single option is always resolved to it, stamped with `updated_at` so
    /// that every replica normalizing the same document agrees. Idempotent:
    /// a decision that already satisfies both rules is left untouched.
    pub fn normalize(&mut self) {
        if let Resolution::Resolved { option_id, .. } = self.resolution {
            if !self.has_option(&option_id) {
                self.resolution = Resolution::Unresolved;
            }
        }

        if let [only] = self.options.as_slice() {
            let already = matches!(
                self.resolution,
                Resolution::Resolved { option_id, .. } if option_id == only.id
            );
            if !already {
                self.resolution = Resolution::Resolved {
                    option_id: only.id,
                    resolved_at: self.updated_at,
                };
            }
        }
    }

    /// Highest scoring option, the earliest one winning ties.
    ///
    /// Returns `None` while no option carries any pro or con.
    #[must_use]
    pub fn recommendation(&self) -> Option<&DecisionOption> {
        if self.options.iter().all(|option| option.factors.is_empty()) {
            return None;
        }
        self.options.iter().reduce(|best, candidate| {
            if candidate.score() > best.score() {
                candidate
            } else {
                best
            }
        })
    }

    fn touch(&mut self) {
        self.updated_at = chrono::Utc::now().timestamp_millis();
    }
}
