//! Request body validation. Each validator either returns the cleaned-up
//! values or an [`ApiError::Validation`] listing every failing field.

use storyloom_db::StoryChanges;
use storyloom_types::api::{
    AddCollaboratorRequest, CreateCommentRequest, CreateStoryRequest, LoginRequest,
    RegisterRequest, UpdateStoryRequest,
};
use storyloom_types::models::Role;

use crate::error::{ApiError, FieldErrors};

const TITLE_MAX: usize = 200;
const CONTENT_MAX: usize = 50_000;
const COMMENT_MAX: usize = 1_000;
const EMAIL_MAX: usize = 255;

#[derive(Default)]
struct Report(FieldErrors);

impl Report {
    fn add(&mut self, field: &str, message: &str) {
        self.0.entry(field.to_string()).or_default().push(message.to_string());
    }

    fn finish<T>(self, value: T) -> Result<T, ApiError> {
        if self.0.is_empty() {
            Ok(value)
        } else {
            Err(ApiError::Validation(self.0))
        }
    }
}

#[derive(Debug)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug)]
pub struct NewStory {
    pub title: String,
    pub content: String,
    pub is_public: bool,
}

pub fn register(req: RegisterRequest) -> Result<NewUser, ApiError> {
    let mut report = Report::default();

    let username = req.username.unwrap_or_default().trim().to_string();
    let len = username.chars().count();
    if len == 0 {
        report.add("username", "Username is required");
    } else {
        if !(3..=30).contains(&len) {
            report.add("username", "Username must be between 3 and 30 characters");
        }
        if !username.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            report.add(
                "username",
                "Username can only contain letters, numbers, and underscores",
            );
        }
    }

    let email = normalize_email(req.email);
    if email.is_empty() {
        report.add("email", "Email is required");
    } else if email.chars().count() > EMAIL_MAX || !looks_like_email(&email) {
        report.add("email", "Invalid email address");
    }

    let password = req.password.unwrap_or_default();
    let len = password.chars().count();
    if len == 0 {
        report.add("password", "Password is required");
    } else {
        if !(8..=128).contains(&len) {
            report.add("password", "Password must be between 8 and 128 characters");
        }
        if !password.chars().any(|c| c.is_ascii_lowercase())
            || !password.chars().any(|c| c.is_ascii_uppercase())
            || !password.chars().any(|c| c.is_ascii_digit())
        {
            report.add(
                "password",
                "Password must contain at least one uppercase letter, one lowercase letter, and one number",
            );
        }
    }

    report.finish(NewUser {
        username,
        email,
        password,
    })
}

pub fn login(req: LoginRequest) -> Result<Credentials, ApiError> {
    let mut report = Report::default();

    let email = normalize_email(req.email);
    if email.is_empty() {
        report.add("email", "Email is required");
    }
    let password = req.password.unwrap_or_default();
    if password.is_empty() {
        report.add("password", "Password is required");
    }

    report.finish(Credentials { email, password })
}

pub fn new_story(req: CreateStoryRequest) -> Result<NewStory, ApiError> {
    let mut report = Report::default();

    let title = req.title.unwrap_or_default().trim().to_string();
    check_title(&mut report, &title, "Title is required");

    let content = req.content.unwrap_or_default();
    check_content(&mut report, &content, "Content is required");

    report.finish(NewStory {
        title,
        content,
        is_public: req.is_public.unwrap_or(false),
    })
}

pub fn story_changes(req: UpdateStoryRequest) -> Result<StoryChanges, ApiError> {
    let mut report = Report::default();

    if req.title.is_none() && req.content.is_none() && req.is_public.is_none() {
        report.add("body", "At least one field must be provided for update");
    }

    let title = req.title.map(|t| t.trim().to_string());
    if let Some(title) = &title {
        check_title(&mut report, title, "Title cannot be empty");
    }
    if let Some(content) = &req.content {
        check_content(&mut report, content, "Content cannot be empty");
    }

    report.finish(StoryChanges {
        title,
        content: req.content,
        is_public: req.is_public,
    })
}

pub fn collaborator(req: AddCollaboratorRequest) -> Result<(i64, Role), ApiError> {
    let mut report = Report::default();

    let user_id = match req.user_id {
        Some(id) if id > 0 => id,
        Some(_) => {
            report.add("userId", "User ID must be a positive integer");
            0
        }
        None => {
            report.add("userId", "User ID is required");
            0
        }
    };

    let role = match req.role.as_deref() {
        None => Role::default(),
        Some(raw) => raw.parse::<Role>().unwrap_or_else(|_| {
            report.add("role", "Role must be either \"editor\" or \"viewer\"");
            Role::default()
        }),
    };

    report.finish((user_id, role))
}

pub fn comment(req: CreateCommentRequest) -> Result<String, ApiError> {
    let mut report = Report::default();

    let content = req.content.unwrap_or_default().trim().to_string();
    let len = content.chars().count();
    if len == 0 {
        report.add("content", "Comment cannot be empty");
    } else if len > COMMENT_MAX {
        report.add("content", "Comment must not exceed 1,000 characters");
    }

    report.finish(content)
}

/// Positive integer path id, e.g. a comment or user id.
pub fn path_id(raw: &str) -> Option<i64> {
    raw.trim().parse::<i64>().ok().filter(|id| *id > 0)
}

fn check_title(report: &mut Report, title: &str, empty_message: &str) {
    let len = title.chars().count();
    if len == 0 {
        report.add("title", empty_message);
    } else if len > TITLE_MAX {
        report.add("title", "Title must not exceed 200 characters");
    }
}

fn check_content(report: &mut Report, content: &str, empty_message: &str) {
    let len = content.chars().count();
    if len == 0 {
        report.add("content", empty_message);
    } else if len > CONTENT_MAX {
        report.add("content", "Content must not exceed 50,000 characters");
    }
}

fn normalize_email(raw: Option<String>) -> String {
    raw.unwrap_or_default().trim().to_lowercase()
}

fn looks_like_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !email.chars().any(char::is_whitespace)
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}
