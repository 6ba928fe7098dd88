use serde::{Deserialize, Serialize};

use crate::{
    catalog::{ConstraintMode, ConstraintValues, Segment, UserConstraint},
    User,
};

impl Segment {
    /// Returns `true` if `user` satisfies the segment constraints under its [`ConstraintMode`].
    pub fn matches(&self, user: &User) -> bool {
        let mut constraints = self.user_constraints.iter();
        match self.constraint_mode {
            ConstraintMode::All => constraints.all(|constraint| constraint.eval(user)),
            ConstraintMode::Any => constraints.any(|constraint| constraint.eval(user)),
        }
    }
}

impl UserConstraint {
    /// Returns `true` if the user param named by the constraint satisfies it.
    pub fn eval(&self, user: &User) -> bool {
        self.operator
            .eval(user.attribute(&self.user_param), &self.values)
    }
}

/// Comparison applied by a [`UserConstraint`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Operator {
    /// Wildcard, always holds.
    All,
    /// Param equals the whole values string.
    Equals,
    /// Param differs from the whole values string.
    DoesNotEqual,
    /// Param is one of the comma-separated values.
    In,
    /// Param is none of the comma-separated values.
    #[serde(rename = "nin")]
    NotIn,
    /// Param contains the values string as a substring.
    Contains,
    /// Param does not contain the values string.
    DoesNotContain,
    /// Operator this SDK version does not know about. Never holds.
    #[serde(other)]
    Unknown,
}

impl Operator {
    /// Applying `Operator` to the values. Returns `false` if the operator cannot be applied, the
    /// attribute is missing, or there's a misconfiguration.
    pub fn eval(&self, attribute: Option<&str>, values: &ConstraintValues) -> bool {
        self.try_eval(attribute, values).unwrap_or(false)
    }

    /// Try applying `Operator` to the values, returning `None` if the operator cannot be applied.
    fn try_eval(&self, attribute: Option<&str>, values: &ConstraintValues) -> Option<bool> {
        match self {
            Self::All => Some(true),
            Self::Unknown => None,

            Self::Equals | Self::DoesNotEqual => {
                let equals = attribute? == values.as_str();
                Some(if *self == Self::Equals {
                    equals
                } else {
                    !equals
                })
            }

            Self::In | Self::NotIn => {
                let s = attribute?;
                let is_in = values.iter().any(|v| v == s);
                Some(if *self == Self::In { is_in } else { !is_in })
            }

            Self::Contains | Self::DoesNotContain => {
                let contains = attribute?.contains(values.as_str());
                Some(if *self == Self::Contains {
                    contains
                } else {
                    !contains
                })
            }
        }
    }
}
