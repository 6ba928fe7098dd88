use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// User parameters that segments can be targeted on.
pub type UserParams = HashMap<String, String>;

/// A user that features are evaluated for.
///
/// `id` is used for percentage rollouts, so it should be stable for the same user. A user with an
/// empty `id` is anonymous: percentage rollouts always admit it.
///
/// ```
/// # use molasses::User;
/// let user = User::new("user-1").with_param("plan", "pro");
/// assert_eq!(user.attribute("plan"), Some("pro"));
/// assert_eq!(user.attribute("id"), Some("user-1"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Stable user identifier.
    pub id: String,
    /// Arbitrary string parameters.
    #[serde(default)]
    pub params: UserParams,
}

impl User {
    /// Param name that always resolves to [`User::id`].
    pub const ID_PARAM: &'static str = "id";

    /// Create a user with the given id and no params.
    pub fn new(id: impl Into<String>) -> User {
        User {
            id: id.into(),
            params: UserParams::new(),
        }
    }

    /// Create a user without an id.
    pub fn anonymous() -> User {
        User::default()
    }

    /// Add a param to the user.
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> User {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Returns `true` if the user has no id.
    pub fn is_anonymous(&self) -> bool {
        self.id.is_empty()
    }

    /// Look up a param by name. [`User::ID_PARAM`] resolves to the user id, even if `params`
    /// happens to contain an `id` entry.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        if name == Self::ID_PARAM {
            return Some(&self.id);
        }
        self.params.get(name).map(String::as_str)
    }
}

impl From<&str> for User {
    fn from(id: &str) -> Self {
        User::new(id)
    }
}

impl From<String> for User {
    fn from(id: String) -> Self {
        User::new(id)
    }
}
