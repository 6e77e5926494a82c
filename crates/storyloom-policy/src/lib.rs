//! Storyloom access policy.
//!
//! Decides whether a principal may read, modify, or delete a story (and the
//! comments and collaborators hanging off it). Evaluation is a pure function
//! over one relation lookup; nothing is cached between calls because roles can
//! change between requests.

pub mod error;
pub mod evaluator;

pub use error::AccessError;
pub use evaluator::{
    Decision, StoryAccess, StoryAccessSource, Verb, authorize, authorize_comment_delete, decide,
    parse_story_id,
};
