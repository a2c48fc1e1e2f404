use axum::extract::{FromRequest, Multipart, Request};
use axum::http::header;
use axum::Form;
use serde::Deserialize;

use crate::app::forms::{ImageUpload, PostInput};
use crate::http::AppError;

/// Post form body, accepted both url-encoded and as multipart (the latter is
/// the only way to attach an image).
#[derive(Debug, Clone, Default)]
pub struct PostForm(pub PostInput);

#[derive(Deserialize)]
struct UrlEncodedPost {
    #[serde(default)]
    text: String,
    #[serde(default)]
    group: Option<String>,
    #[serde(default, rename = "image-clear")]
    image_clear: Option<String>,
}

/// Checkbox semantics: present and non-empty means checked.
fn is_checked(value: Option<&str>) -> bool {
    value.map_or(false, |value| !value.trim().is_empty())
}

#[axum::async_trait]
impl<S> FromRequest<S> for PostForm
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_multipart = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.starts_with("multipart/form-data"))
            .unwrap_or(false);

        if !is_multipart {
            let Form(raw) = Form::<UrlEncodedPost>::from_request(req, state)
                .await
                .map_err(|err| AppError::bad_request(err.body_text()))?;
            return Ok(PostForm(PostInput {
                text: raw.text,
                group: raw.group,
                image: None,
                clear_image: is_checked(raw.image_clear.as_deref()),
            }));
        }

        let mut multipart = Multipart::from_request(req, state)
            .await
            .map_err(|err| AppError::bad_request(err.body_text()))?;

        let mut input = PostInput::default();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|err| AppError::bad_request(err.body_text()))?
        {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "text" => {
                    input.text = field
                        .text()
                        .await
                        .map_err(|err| AppError::bad_request(err.body_text()))?;
                }
                "group" => {
                    input.group = Some(
                        field
                            .text()
                            .await
                            .map_err(|err| AppError::bad_request(err.body_text()))?,
                    );
                }
                "image-clear" => {
                    let value = field
                        .text()
                        .await
                        .map_err(|err| AppError::bad_request(err.body_text()))?;
                    input.clear_image = is_checked(Some(&value));
                }
                "image" => {
                    let file_name = field.file_name().map(str::to_string);
                    let bytes = field
                        .bytes()
                        .await
                        .map_err(|err| AppError::bad_request(err.body_text()))?;
                    if !bytes.is_empty() {
                        input.image = Some(ImageUpload {
                            file_name,
                            bytes: bytes.to_vec(),
                        });
                    }
                }
                _ => {}
            }
        }

        Ok(PostForm(input))
    }
}
