use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    Form, Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::app::auth::{AuthService, SignupOutcome};
use crate::app::comments::CommentService;
use crate::app::feed::FeedService;
use crate::app::forms::{self, FormErrors, SignupInput};
use crate::app::groups::GroupService;
use crate::app::media::{ImageLimits, MediaService};
use crate::app::posts::{ImageUpdate, PostService};
use crate::app::social::SocialService;
use crate::app::users::UserService;
use crate::domain::post::Post;
use crate::http::auth::{expired_session_cookie, session_cookie};
use crate::http::forms::PostForm;
use crate::http::views::{self, PostDetail, PostFormView, SignupFormView};
use crate::http::{AdminToken, AppError, AuthUser};
use crate::AppState;

#[derive(Serialize)]
pub(crate) struct HealthResponse {
    status: &'static str,
}

#[derive(Deserialize)]
pub struct PageQuery {
    pub page: Option<String>,
}

/// Reports `degraded` with a 503 while Postgres or Redis is unreachable.
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let db = state.db.ping().await;
    let cache = state.cache.ping().await;
    if let Err(err) = &db {
        tracing::warn!(error = ?err, "database health check failed");
    }
    if let Err(err) = &cache {
        tracing::warn!(error = ?err, "redis health check failed");
    }

    if db.is_ok() && cache.is_ok() {
        (StatusCode::OK, Json(HealthResponse { status: "ok" }))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse { status: "degraded" }),
        )
    }
}

pub async fn not_found() -> AppError {
    AppError::not_found("page not found")
}

/// Post ids arrive as raw path segments; anything that is not a uuid cannot
/// name a post.
fn parse_post_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::not_found("post not found"))
}

fn feed_service(state: &AppState) -> FeedService {
    FeedService::new(state.db.clone(), state.page_size)
}

fn auth_service(state: &AppState) -> AuthService {
    AuthService::new(
        state.db.clone(),
        state.session_key,
        state.session_ttl_minutes,
    )
}

pub async fn index(
    viewer: Option<AuthUser>,
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Html<String>, AppError> {
    let mut page = feed_service(&state)
        .global_feed(query.page.as_deref())
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to load index feed");
            AppError::internal("failed to load posts")
        })?;
    MediaService::new(state.storage.clone()).populate_image_urls(&mut page.items);

    Ok(Html(views::index_page(&page, viewer.as_ref())))
}

pub async fn group_posts(
    Path(slug): Path<String>,
    viewer: Option<AuthUser>,
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Html<String>, AppError> {
    let feed = feed_service(&state)
        .group_feed(&slug, query.page.as_deref())
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, slug = %slug, "failed to load group feed");
            AppError::internal("failed to load posts")
        })?;
    let Some(mut feed) = feed else {
        return Err(AppError::not_found("group not found"));
    };
    MediaService::new(state.storage.clone()).populate_image_urls(&mut feed.page.items);

    Ok(Html(views::group_page(&feed, viewer.as_ref())))
}

pub async fn profile(
    Path(username): Path<String>,
    viewer: Option<AuthUser>,
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Html<String>, AppError> {
    let viewer_id = viewer.as_ref().map(|user| user.user_id);
    let feed = feed_service(&state)
        .profile_feed(&username, viewer_id, query.page.as_deref())
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, username = %username, "failed to load profile");
            AppError::internal("failed to load profile")
        })?;
    let Some(mut feed) = feed else {
        return Err(AppError::not_found("user not found"));
    };
    MediaService::new(state.storage.clone()).populate_image_urls(&mut feed.page.items);

    Ok(Html(views::profile_page(&feed, viewer.as_ref())))
}

async fn load_post(state: &AppState, post_id: Uuid) -> Result<Post, AppError> {
    let post = PostService::new(state.db.clone())
        .get_post(post_id)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, post_id = %post_id, "failed to fetch post");
            AppError::internal("failed to fetch post")
        })?
        .ok_or_else(|| AppError::not_found("post not found"))?;
    Ok(post)
}

async fn render_post_detail(
    state: &AppState,
    mut post: Post,
    comment_text: &str,
    comment_errors: &FormErrors,
    viewer: Option<&AuthUser>,
) -> Result<Html<String>, AppError> {
    let author_post_count = PostService::new(state.db.clone())
        .count_by_author(post.author_id)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, author_id = %post.author_id, "failed to count posts");
            AppError::internal("failed to fetch post")
        })?;
    let comments = CommentService::new(state.db.clone())
        .list_for_post(post.id)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, post_id = %post.id, "failed to list comments");
            AppError::internal("failed to fetch post")
        })?;
    MediaService::new(state.storage.clone()).populate_image_url(&mut post);

    let detail = PostDetail {
        post: &post,
        author_post_count,
        comments: &comments,
    };
    Ok(Html(views::post_detail_page(
        &detail,
        comment_text,
        comment_errors,
        viewer,
    )))
}

pub async fn post_detail(
    Path(id): Path<String>,
    viewer: Option<AuthUser>,
    State(state): State<AppState>,
) -> Result<Html<String>, AppError> {
    let post = load_post(&state, parse_post_id(&id)?).await?;
    render_post_detail(&state, post, "", &FormErrors::default(), viewer.as_ref()).await
}

async fn list_groups(state: &AppState) -> Result<Vec<crate::domain::group::Group>, AppError> {
    GroupService::new(state.db.clone())
        .list_groups()
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to list groups");
            AppError::internal("failed to load groups")
        })
}

pub async fn create_post_form(
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Html<String>, AppError> {
    let groups = list_groups(&state).await?;
    let form = PostFormView {
        editing: None,
        text: "",
        group: None,
        errors: &FormErrors::default(),
    };
    Ok(Html(views::post_form_page(&form, &groups, Some(&auth))))
}

pub async fn create_post(
    auth: AuthUser,
    State(state): State<AppState>,
    PostForm(input): PostForm,
) -> Result<Response, AppError> {
    let groups = list_groups(&state).await?;
    let text = input.text.clone();
    let group = input.group.clone();

    let limits = ImageLimits::for_upload(state.upload_max_bytes);
    let clean = match forms::validate_post(input, &groups, limits).await {
        Ok(clean) => clean,
        Err(errors) => {
            let form = PostFormView {
                editing: None,
                text: &text,
                group: group.as_deref(),
                errors: &errors,
            };
            return Ok(Html(views::post_form_page(&form, &groups, Some(&auth))).into_response());
        }
    };

    let media = MediaService::new(state.storage.clone());
    let image_key = match clean.image {
        Some(image) => Some(media.store_post_image(auth.user_id, image).await.map_err(|err| {
            tracing::error!(error = ?err, author_id = %auth.user_id, "failed to store post image");
            AppError::internal("failed to store image")
        })?),
        None => None,
    };

    let post = PostService::new(state.db.clone())
        .create_post(auth.user_id, clean.draft, image_key.clone())
        .await
        .map(Some);
    let post = media
        .discard_unless_saved(image_key.as_deref(), post)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, author_id = %auth.user_id, "failed to create post");
            AppError::internal("failed to create post")
        })?
        .ok_or_else(|| AppError::internal("failed to create post"))?;

    tracing::info!(post_id = %post.id, author_id = %auth.user_id, "post created");
    Ok(Redirect::to(&format!("/profile/{}/", auth.username)).into_response())
}

pub async fn edit_post_form(
    Path(id): Path<String>,
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Response, AppError> {
    let mut post = load_post(&state, parse_post_id(&id)?).await?;
    if post.author_id != auth.user_id {
        return Ok(Redirect::to(&format!("/posts/{}/", post.id)).into_response());
    }

    let groups = list_groups(&state).await?;
    MediaService::new(state.storage.clone()).populate_image_url(&mut post);
    let group = post.group_id.map(|id| id.to_string());
    let form = PostFormView {
        editing: Some(&post),
        text: &post.text,
        group: group.as_deref(),
        errors: &FormErrors::default(),
    };
    Ok(Html(views::post_form_page(&form, &groups, Some(&auth))).into_response())
}

pub async fn edit_post(
    Path(id): Path<String>,
    auth: AuthUser,
    State(state): State<AppState>,
    PostForm(input): PostForm,
) -> Result<Response, AppError> {
    let mut post = load_post(&state, parse_post_id(&id)?).await?;
    if post.author_id != auth.user_id {
        return Ok(Redirect::to(&format!("/posts/{}/", post.id)).into_response());
    }

    let groups = list_groups(&state).await?;
    let text = input.text.clone();
    let group = input.group.clone();
    let media = MediaService::new(state.storage.clone());

    let limits = ImageLimits::for_upload(state.upload_max_bytes);
    let clean = match forms::validate_post(input, &groups, limits).await {
        Ok(clean) => clean,
        Err(errors) => {
            media.populate_image_url(&mut post);
            let form = PostFormView {
                editing: Some(&post),
                text: &text,
                group: group.as_deref(),
                errors: &errors,
            };
            return Ok(Html(views::post_form_page(&form, &groups, Some(&auth))).into_response());
        }
    };

    let image = match clean.image {
        Some(image) => {
            let key = media.store_post_image(auth.user_id, image).await.map_err(|err| {
                tracing::error!(error = ?err, post_id = %post.id, "failed to store post image");
                AppError::internal("failed to store image")
            })?;
            ImageUpdate::Replace(key)
        }
        None if clean.clear_image => ImageUpdate::Clear,
        None => ImageUpdate::Keep,
    };
    let drops_previous = image.drops_previous();
    let new_key = image.new_key().map(str::to_string);

    let updated = PostService::new(state.db.clone())
        .update_post(post.id, auth.user_id, clean.draft, image)
        .await;
    let updated = media
        .discard_unless_saved(new_key.as_deref(), updated)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, post_id = %post.id, "failed to update post");
            AppError::internal("failed to update post")
        })?
        .ok_or_else(|| AppError::not_found("post not found"))?;

    if drops_previous {
        if let Some(old_key) = post.image_key.as_deref() {
            media.delete_image(old_key).await;
        }
    }

    tracing::info!(post_id = %updated.id, "post updated");
    Ok(Redirect::to(&format!("/posts/{}/", updated.id)).into_response())
}

pub async fn delete_post(
    Path(id): Path<String>,
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Redirect, AppError> {
    let post = load_post(&state, parse_post_id(&id)?).await?;
    if post.author_id != auth.user_id {
        return Ok(Redirect::to(&format!("/posts/{}/", post.id)));
    }

    let removed = PostService::new(state.db.clone())
        .delete_post(post.id, auth.user_id)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, post_id = %post.id, "failed to delete post");
            AppError::internal("failed to delete post")
        })?;
    let Some(image_key) = removed else {
        return Err(AppError::not_found("post not found"));
    };
    if let Some(key) = image_key {
        MediaService::new(state.storage.clone()).delete_image(&key).await;
    }

    tracing::info!(post_id = %post.id, "post deleted");
    Ok(Redirect::to(&format!("/profile/{}/", auth.username)))
}

#[derive(Deserialize)]
pub struct CommentForm {
    #[serde(default)]
    pub text: String,
}

pub async fn add_comment(
    Path(id): Path<String>,
    auth: AuthUser,
    State(state): State<AppState>,
    Form(payload): Form<CommentForm>,
) -> Result<Response, AppError> {
    let post = load_post(&state, parse_post_id(&id)?).await?;

    let text = match forms::validate_comment(&payload.text) {
        Ok(text) => text,
        Err(errors) => {
            let page =
                render_post_detail(&state, post, &payload.text, &errors, Some(&auth)).await?;
            return Ok(page.into_response());
        }
    };

    let comment = CommentService::new(state.db.clone())
        .add_comment(post.id, auth.user_id, text)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, post_id = %post.id, "failed to add comment");
            AppError::internal("failed to add comment")
        })?;

    tracing::info!(comment_id = %comment.id, post_id = %post.id, "comment added");
    Ok(Redirect::to(&format!("/posts/{}/", post.id)).into_response())
}

pub async fn follow_index(
    auth: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Html<String>, AppError> {
    let mut page = feed_service(&state)
        .follow_feed(auth.user_id, query.page.as_deref())
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, user_id = %auth.user_id, "failed to load follow feed");
            AppError::internal("failed to load posts")
        })?;
    MediaService::new(state.storage.clone()).populate_image_urls(&mut page.items);

    Ok(Html(views::follow_page(&page, Some(&auth))))
}

async fn find_author(state: &AppState, username: &str) -> Result<crate::domain::user::User, AppError> {
    UserService::new(state.db.clone())
        .find_by_username(username)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, username = %username, "failed to fetch user");
            AppError::internal("failed to fetch user")
        })?
        .ok_or_else(|| AppError::not_found("user not found"))
}

pub async fn profile_follow(
    Path(username): Path<String>,
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Redirect, AppError> {
    let author = find_author(&state, &username).await?;
    let follow = SocialService::new(state.db.clone())
        .follow(auth.user_id, author.id)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, user_id = %auth.user_id, author_id = %author.id, "failed to follow");
            AppError::internal("failed to follow")
        })?;
    if follow.is_some() {
        tracing::info!(user_id = %auth.user_id, author_id = %author.id, "followed author");
    }

    Ok(Redirect::to(&format!("/profile/{}/", author.username)))
}

pub async fn profile_unfollow(
    Path(username): Path<String>,
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Redirect, AppError> {
    let author = find_author(&state, &username).await?;
    let removed = SocialService::new(state.db.clone())
        .unfollow(auth.user_id, author.id)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, user_id = %auth.user_id, author_id = %author.id, "failed to unfollow");
            AppError::internal("failed to unfollow")
        })?;
    if !removed {
        return Err(AppError::not_found("follow not found"));
    }

    tracing::info!(user_id = %auth.user_id, author_id = %author.id, "unfollowed author");
    Ok(Redirect::to(&format!("/profile/{}/", author.username)))
}

pub async fn signup_form() -> Html<String> {
    let form = SignupFormView {
        username: "",
        display_name: "",
        email: "",
        errors: &FormErrors::default(),
    };
    Html(views::signup_page(&form))
}

pub async fn signup(
    State(state): State<AppState>,
    Form(payload): Form<SignupInput>,
) -> Result<Response, AppError> {
    let username = payload.username.clone();
    let display_name = payload.display_name.clone();
    let email = payload.email.clone();
    let rerender = |errors: &FormErrors| {
        let form = SignupFormView {
            username: &username,
            display_name: &display_name,
            email: &email,
            errors,
        };
        Html(views::signup_page(&form)).into_response()
    };

    let clean = match forms::validate_signup(payload) {
        Ok(clean) => clean,
        Err(errors) => return Ok(rerender(&errors)),
    };

    let service = auth_service(&state);
    let outcome = service.signup(clean).await.map_err(|err| {
        tracing::error!(error = ?err, "failed to sign up");
        AppError::internal("failed to sign up")
    })?;
    let user = match outcome {
        SignupOutcome::Created(user) => user,
        SignupOutcome::UsernameTaken => {
            let mut errors = FormErrors::default();
            errors.add("username", "A user with that username already exists.");
            return Ok(rerender(&errors));
        }
    };

    let session = service.issue_session(user.id).map_err(|err| {
        tracing::error!(error = ?err, user_id = %user.id, "failed to issue session");
        AppError::internal("failed to sign up")
    })?;

    tracing::info!(user_id = %user.id, username = %user.username, "user signed up");
    Ok((
        [(header::SET_COOKIE, session_cookie(&session))],
        Redirect::to("/"),
    )
        .into_response())
}

#[derive(Deserialize)]
pub struct LoginQuery {
    pub next: Option<String>,
}

pub async fn login_form(Query(query): Query<LoginQuery>) -> Html<String> {
    Html(views::login_page("", query.next.as_deref(), false))
}

#[derive(Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    pub next: Option<String>,
}

/// Only same-site absolute paths are followed after login.
fn safe_next(next: Option<&str>) -> &str {
    match next {
        Some(path) if path.starts_with('/') && !path.starts_with("//") && !path.contains('\\') => {
            path
        }
        _ => "/",
    }
}

pub async fn login(
    State(state): State<AppState>,
    Form(payload): Form<LoginForm>,
) -> Result<Response, AppError> {
    const MAX_PASSWORD_LEN: usize = 128;

    let failed = || {
        Html(views::login_page(
            &payload.username,
            payload.next.as_deref(),
            true,
        ))
        .into_response()
    };

    if payload.username.trim().is_empty()
        || payload.password.is_empty()
        || payload.password.len() > MAX_PASSWORD_LEN
    {
        return Ok(failed());
    }

    let session = auth_service(&state)
        .login(payload.username.trim(), &payload.password)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to login");
            AppError::internal("failed to login")
        })?;
    let Some(session) = session else {
        return Ok(failed());
    };

    Ok((
        [(header::SET_COOKIE, session_cookie(&session))],
        Redirect::to(safe_next(payload.next.as_deref())),
    )
        .into_response())
}

pub async fn logout() -> Response {
    (
        [(header::SET_COOKIE, expired_session_cookie())],
        Html(views::logged_out_page()),
    )
        .into_response()
}

pub async fn about_author(viewer: Option<AuthUser>) -> Html<String> {
    Html(views::about_author_page(viewer.as_ref()))
}

pub async fn about_tech(viewer: Option<AuthUser>) -> Html<String> {
    Html(views::about_tech_page(viewer.as_ref()))
}

pub async fn admin_clear_cache(
    _admin: AdminToken,
    State(state): State<AppState>,
) -> Result<StatusCode, AppError> {
    let removed = state.cache.clear_pages().await.map_err(|err| {
        tracing::error!(error = ?err, "failed to clear page cache");
        AppError::internal("failed to clear cache")
    })?;

    tracing::info!(removed, "page cache cleared");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub struct GroupForm {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub description: String,
}

fn valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug.len() <= 50
        && slug
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

pub async fn admin_create_group(
    _admin: AdminToken,
    State(state): State<AppState>,
    Form(payload): Form<GroupForm>,
) -> Result<Redirect, AppError> {
    let title = payload.title.trim();
    let slug = payload.slug.trim();
    if title.is_empty() || title.chars().count() > 200 {
        return Err(AppError::bad_request("title must be 1-200 characters"));
    }
    if !valid_slug(slug) {
        return Err(AppError::bad_request(
            "slug must be 1-50 letters, digits, hyphens or underscores",
        ));
    }

    let group = GroupService::new(state.db.clone())
        .create_group(title, slug, payload.description.trim())
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, slug = %slug, "failed to create group");
            AppError::internal("failed to create group")
        })?
        .ok_or_else(|| AppError::conflict("slug already taken"))?;

    tracing::info!(group_id = %group.id, slug = %group.slug, "group created");
    Ok(Redirect::to(&format!("/group/{}/", group.slug)))
}
