//! Server-side form validation. Every validator returns either clean values or
//! a [`FormErrors`] map that the handlers render back next to the fields.

use std::collections::BTreeMap;

use serde::Deserialize;
use uuid::Uuid;

use crate::app::media::{check_image, CheckedImage, ImageLimits};
use crate::domain::group::Group;
use crate::domain::post::PostDraft;

pub const REQUIRED: &str = "This field is required.";
pub const INVALID_CHOICE: &str = "Select a valid choice. That choice is not one of the available choices.";
pub const INVALID_IMAGE: &str =
    "Upload a valid image. The file you uploaded was either not an image or a corrupted image.";
pub const IMAGE_CONFLICT: &str = "Please either submit a file or check the clear checkbox, not both.";

const USERNAME_MAX_LEN: usize = 150;
const PASSWORD_MIN_LEN: usize = 8;
const PASSWORD_MAX_LEN: usize = 128;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormErrors {
    fields: BTreeMap<&'static str, Vec<String>>,
}

impl FormErrors {
    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.fields.entry(field).or_default().push(message.into());
    }

    pub fn get(&self, field: &str) -> &[String] {
        self.fields.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn into_result<T>(self, value: T) -> Result<T, FormErrors> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }
}

/// A file part from a multipart form.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: Option<String>,
    pub bytes: Vec<u8>,
}

/// Raw post form as submitted.
#[derive(Debug, Clone, Default)]
pub struct PostInput {
    pub text: String,
    pub group: Option<String>,
    pub image: Option<ImageUpload>,
    /// The "clear" checkbox next to an existing image.
    pub clear_image: bool,
}

#[derive(Debug, Clone)]
pub struct CleanPost {
    pub draft: PostDraft,
    pub image: Option<CheckedImage>,
    pub clear_image: bool,
}

/// `group` is the submitted group id; empty means no group. Image decoding
/// runs on the blocking pool within `limits`.
pub async fn validate_post(
    input: PostInput,
    groups: &[Group],
    limits: ImageLimits,
) -> Result<CleanPost, FormErrors> {
    let mut errors = FormErrors::default();

    let text = input.text.trim().to_string();
    if text.is_empty() {
        errors.add("text", REQUIRED);
    }

    let group_id = match input.group.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => match Uuid::parse_str(raw) {
            Ok(id) if groups.iter().any(|group| group.id == id) => Some(id),
            _ => {
                errors.add("group", INVALID_CHOICE);
                None
            }
        },
    };

    let image = match input.image {
        Some(upload) if !upload.bytes.is_empty() && input.clear_image => {
            tracing::debug!(file_name = ?upload.file_name, "image upload together with clear");
            errors.add("image", IMAGE_CONFLICT);
            None
        }
        Some(upload) if !upload.bytes.is_empty() => match check_image(upload.bytes, limits).await {
            Ok(image) => Some(image),
            Err(err) => {
                tracing::debug!(error = %err, file_name = ?upload.file_name, "rejected image upload");
                errors.add("image", INVALID_IMAGE);
                None
            }
        },
        _ => None,
    };

    errors.into_result(CleanPost {
        draft: PostDraft { text, group_id },
        image,
        clear_image: input.clear_image,
    })
}

pub fn validate_comment(text: &str) -> Result<String, FormErrors> {
    let mut errors = FormErrors::default();
    let text = text.trim();
    if text.is_empty() {
        errors.add("text", REQUIRED);
    }
    errors.into_result(text.to_string())
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SignupInput {
    pub username: String,
    pub display_name: String,
    pub email: String,
    pub password: String,
    pub password_confirm: String,
}

#[derive(Debug, Clone)]
pub struct CleanSignup {
    pub username: String,
    pub display_name: String,
    pub email: String,
    pub password: String,
}

pub fn validate_signup(input: SignupInput) -> Result<CleanSignup, FormErrors> {
    let mut errors = FormErrors::default();

    let username = input.username.trim().to_string();
    if username.is_empty() {
        errors.add("username", REQUIRED);
    } else if username.chars().count() > USERNAME_MAX_LEN {
        errors.add("username", "Ensure this value has at most 150 characters.");
    } else if !username
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_'))
    {
        errors.add(
            "username",
            "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.",
        );
    }

    let email = input.email.trim().to_string();
    if !email.is_empty() && !looks_like_email(&email) {
        errors.add("email", "Enter a valid email address.");
    }

    if input.password.is_empty() {
        errors.add("password", REQUIRED);
    } else if input.password.chars().count() < PASSWORD_MIN_LEN {
        errors.add("password", "This password is too short. It must contain at least 8 characters.");
    } else if input.password.len() > PASSWORD_MAX_LEN {
        errors.add("password", "Ensure this value has at most 128 characters.");
    }
    if input.password != input.password_confirm {
        errors.add("password_confirm", "The two password fields didn't match.");
    }

    errors.into_result(CleanSignup {
        username,
        display_name: input.display_name.trim().to_string(),
        email,
        password: input.password,
    })
}

fn looks_like_email(value: &str) -> bool {
    match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;

    fn limits() -> ImageLimits {
        ImageLimits::for_upload(1024 * 1024)
    }

    fn group(slug: &str) -> Group {
        Group {
            id: Uuid::new_v4(),
            title: slug.to_uppercase(),
            slug: slug.to_string(),
            description: String::new(),
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[tokio::test]
    async fn post_requires_text() {
        let errors = validate_post(
            PostInput {
                text: "   \n".to_string(),
                ..PostInput::default()
            },
            &[],
            limits(),
        )
        .await
        .unwrap_err();
        assert_eq!(errors.get("text"), [REQUIRED.to_string()]);
        assert!(errors.get("group").is_empty());
    }

    #[tokio::test]
    async fn post_without_group_keeps_group_unset() {
        let clean = validate_post(
            PostInput {
                text: "hello".to_string(),
                group: Some(String::new()),
                image: None,
                clear_image: false,
            },
            &[group("cats")],
            limits(),
        )
        .await
        .unwrap();
        assert_eq!(clean.draft.text, "hello");
        assert_eq!(clean.draft.group_id, None);
        assert!(clean.image.is_none());
    }

    #[tokio::test]
    async fn post_accepts_known_group() {
        let cats = group("cats");
        let clean = validate_post(
            PostInput {
                text: "hello".to_string(),
                group: Some(cats.id.to_string()),
                image: None,
                clear_image: false,
            },
            &[cats.clone(), group("dogs")],
            limits(),
        )
        .await
        .unwrap();
        assert_eq!(clean.draft.group_id, Some(cats.id));
    }

    #[tokio::test]
    async fn post_rejects_unknown_group() {
        let errors = validate_post(
            PostInput {
                text: "hello".to_string(),
                group: Some(Uuid::new_v4().to_string()),
                image: None,
                clear_image: false,
            },
            &[group("cats")],
            limits(),
        )
        .await
        .unwrap_err();
        assert_eq!(errors.get("group"), [INVALID_CHOICE.to_string()]);

        let errors = validate_post(
            PostInput {
                text: "hello".to_string(),
                group: Some("cats".to_string()),
                image: None,
                clear_image: false,
            },
            &[group("cats")],
            limits(),
        )
        .await
        .unwrap_err();
        assert_eq!(errors.get("group"), [INVALID_CHOICE.to_string()]);
    }

    #[tokio::test]
    async fn post_rejects_broken_image_but_ignores_empty_file() {
        let errors = validate_post(
            PostInput {
                text: "hello".to_string(),
                group: None,
                image: Some(ImageUpload {
                    file_name: Some("notes.txt".to_string()),
                    bytes: b"plain text".to_vec(),
                }),
                clear_image: false,
            },
            &[],
            limits(),
        )
        .await
        .unwrap_err();
        assert_eq!(errors.get("image"), [INVALID_IMAGE.to_string()]);

        let clean = validate_post(
            PostInput {
                text: "hello".to_string(),
                group: None,
                image: Some(ImageUpload {
                    file_name: None,
                    bytes: Vec::new(),
                }),
                clear_image: false,
            },
            &[],
            limits(),
        )
        .await
        .unwrap();
        assert!(clean.image.is_none());
    }

    #[tokio::test]
    async fn post_image_and_clear_conflict() {
        let errors = validate_post(
            PostInput {
                text: "hello".to_string(),
                group: None,
                image: Some(ImageUpload {
                    file_name: Some("cat.gif".to_string()),
                    bytes: b"GIF89a".to_vec(),
                }),
                clear_image: true,
            },
            &[],
            limits(),
        )
        .await
        .unwrap_err();
        assert_eq!(errors.get("image"), [IMAGE_CONFLICT.to_string()]);

        let clean = validate_post(
            PostInput {
                text: "hello".to_string(),
                clear_image: true,
                ..PostInput::default()
            },
            &[],
            limits(),
        )
        .await
        .unwrap();
        assert!(clean.clear_image);
    }

    #[test]
    fn comment_is_trimmed_and_required() {
        assert_eq!(validate_comment("  nice  ").unwrap(), "nice");
        assert_eq!(validate_comment(" ").unwrap_err().get("text"), [REQUIRED.to_string()]);
    }

    fn signup(username: &str, password: &str, confirm: &str) -> SignupInput {
        SignupInput {
            username: username.to_string(),
            display_name: String::new(),
            email: String::new(),
            password: password.to_string(),
            password_confirm: confirm.to_string(),
        }
    }

    #[test]
    fn signup_accepts_valid_input() {
        let clean = validate_signup(signup(" leo.t ", "correct horse", "correct horse")).unwrap();
        assert_eq!(clean.username, "leo.t");
    }

    #[test]
    fn signup_reports_every_bad_field() {
        let mut input = signup("bad name!", "short", "other");
        input.email = "nope".to_string();
        let errors = validate_signup(input).unwrap_err();
        assert_eq!(errors.get("username").len(), 1);
        assert_eq!(errors.get("email").len(), 1);
        assert_eq!(errors.get("password").len(), 1);
        assert_eq!(errors.get("password_confirm").len(), 1);
    }

    #[test]
    fn signup_limits_username_length() {
        let long = "a".repeat(151);
        let errors = validate_signup(signup(&long, "longenough", "longenough")).unwrap_err();
        assert_eq!(errors.get("username").len(), 1);
    }
}
