use anyhow::Result;
use tracing::debug;

use storyloom_types::models::Role;

use crate::error::AccessError;

/// HTTP verb of the request being authorized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

/// Each verb lands in exactly one permission tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tier {
    Read,
    Modify,
    Delete,
}

impl Verb {
    pub const ALL: [Verb; 5] = [Verb::Get, Verb::Post, Verb::Put, Verb::Patch, Verb::Delete];

    /// Map an HTTP method name. Methods outside the five verbs return `None`.
    pub fn from_method(method: &str) -> Option<Self> {
        match method {
            "GET" => Some(Self::Get),
            "POST" => Some(Self::Post),
            "PUT" => Some(Self::Put),
            "PATCH" => Some(Self::Patch),
            "DELETE" => Some(Self::Delete),
            _ => None,
        }
    }

    fn tier(self) -> Tier {
        match self {
            Self::Get => Tier::Read,
            Self::Post | Self::Put | Self::Patch => Tier::Modify,
            Self::Delete => Tier::Delete,
        }
    }
}

/// What the policy needs to know about a story relative to one principal:
/// the story row plus that principal's collaborator role, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoryAccess {
    pub story_id: i64,
    pub author_id: i64,
    pub is_public: bool,
    pub role: Option<Role>,
}

/// Single-lookup source of [`StoryAccess`]. Returns `Ok(None)` when no story
/// has the given id.
pub trait StoryAccessSource {
    fn story_access(&self, story_id: i64, principal_id: i64) -> Result<Option<StoryAccess>>;
}

impl<T: StoryAccessSource + ?Sized> StoryAccessSource for &T {
    fn story_access(&self, story_id: i64, principal_id: i64) -> Result<Option<StoryAccess>> {
        (**self).story_access(story_id, principal_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    pub fn is_allowed(self) -> bool {
        self == Self::Allow
    }

    fn from_bool(allowed: bool) -> Self {
        if allowed { Self::Allow } else { Self::Deny }
    }
}

/// Story ids must be positive integers.
pub fn parse_story_id(raw: &str) -> Option<i64> {
    raw.trim().parse::<i64>().ok().filter(|id| *id > 0)
}

/// Pure verb decision over already-fetched state.
pub fn decide(principal_id: i64, access: &StoryAccess, verb: Verb) -> Decision {
    let is_author = access.author_id == principal_id;
    let is_collaborator = access.role.is_some();
    let is_editor = access.role == Some(Role::Editor);

    let allowed = match verb.tier() {
        Tier::Read => is_author || is_collaborator || access.is_public,
        Tier::Modify => is_author || is_editor,
        Tier::Delete => is_author,
    };

    Decision::from_bool(allowed)
}

/// Authorize `verb` on the story named by `raw_story_id`.
///
/// Checks run in order: authentication, id syntax, existence, permission. On
/// success the fetched [`StoryAccess`] is handed back so callers can reuse the
/// parsed id.
pub fn authorize<S>(
    source: &S,
    principal_id: Option<i64>,
    raw_story_id: &str,
    verb: Verb,
) -> Result<StoryAccess, AccessError>
where
    S: StoryAccessSource + ?Sized,
{
    let principal_id = principal_id.ok_or(AccessError::Unauthenticated)?;
    let story_id = parse_story_id(raw_story_id).ok_or(AccessError::InvalidInput)?;

    let access = source
        .story_access(story_id, principal_id)
        .map_err(AccessError::Unexpected)?
        .ok_or(AccessError::NotFound)?;

    match decide(principal_id, &access, verb) {
        Decision::Allow => Ok(access),
        Decision::Deny => {
            debug!(principal_id, story_id, ?verb, "story access denied");
            Err(AccessError::Forbidden)
        }
    }
}

/// Comments are removable only by whoever wrote them. Story roles, including
/// authorship of the story, play no part.
pub fn authorize_comment_delete(principal_id: i64, comment_author_id: i64) -> Decision {
    Decision::from_bool(principal_id == comment_author_id)
}
