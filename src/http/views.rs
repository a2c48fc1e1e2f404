//! Server-side HTML rendering.
//!
//! Pages are assembled from small string builders. Everything that comes from
//! users or the database goes through [`escape`] before it reaches the markup.

use axum::http::StatusCode;
use time::format_description::FormatItem;
use time::macros::format_description;
use time::OffsetDateTime;

use crate::app::feed::{GroupFeed, ProfileFeed};
use crate::app::forms::FormErrors;
use crate::app::pagination::Page;
use crate::domain::comment::Comment;
use crate::domain::group::Group;
use crate::domain::post::Post;
use crate::http::AuthUser;

const DATE_FORMAT: &[FormatItem<'static>] =
    format_description!("[day].[month].[year] [hour]:[minute]");

/// Minimal HTML escaping for text and attribute values.
pub fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

/// Escaped text with line breaks kept.
fn linebreaks(value: &str) -> String {
    escape(value).replace("\r\n", "\n").replace('\n', "<br>")
}

fn format_date(value: OffsetDateTime) -> String {
    value.format(DATE_FORMAT).unwrap_or_default()
}

fn layout(title: &str, viewer: Option<&AuthUser>, content: &str) -> String {
    let account = match viewer {
        Some(user) => format!(
            "<li><a href=\"/create/\">New post</a></li>\
             <li><a href=\"/follow/\">Following</a></li>\
             <li><a href=\"/profile/{name}/\">{name}</a></li>\
             <li><a href=\"/auth/logout/\">Log out</a></li>",
            name = escape(&user.username)
        ),
        None => "<li><a href=\"/auth/login/\">Log in</a></li>\
                 <li><a href=\"/auth/signup/\">Sign up</a></li>"
            .to_string(),
    };

    format!(
        "<!DOCTYPE html>\
         <html lang=\"en\">\
         <head><meta charset=\"utf-8\"><title>{title}</title></head>\
         <body>\
         <header><nav><ul>\
         <li><a href=\"/\">Home</a></li>\
         <li><a href=\"/about/author/\">About the author</a></li>\
         <li><a href=\"/about/tech/\">Technologies</a></li>\
         {account}\
         </ul></nav></header>\
         <main>{content}</main>\
         <footer><p>Yatube</p></footer>\
         </body></html>",
        title = escape(title),
    )
}

fn field_errors(errors: &FormErrors, field: &str) -> String {
    let messages = errors.get(field);
    if messages.is_empty() {
        return String::new();
    }
    let items: String = messages
        .iter()
        .map(|message| format!("<li>{}</li>", escape(message)))
        .collect();
    format!("<ul class=\"errorlist\" data-field=\"{}\">{}</ul>", escape(field), items)
}

fn post_card(post: &Post, show_group_link: bool) -> String {
    let mut html = format!(
        "<article class=\"post\" data-post-id=\"{id}\">\
         <ul class=\"post-meta\">\
         <li>Author: <a href=\"/profile/{username}/\">{author}</a></li>\
         <li>Date: {date}</li>\
         </ul>",
        id = post.id,
        username = escape(&post.author_username),
        author = escape(post.author_name()),
        date = format_date(post.created_at),
    );

    if let Some(url) = &post.image_url {
        html.push_str(&format!(
            "<img class=\"post-image\" src=\"{}\" alt=\"\">",
            escape(url)
        ));
    }

    html.push_str(&format!(
        "<p class=\"post-text\">{}</p><a href=\"/posts/{}/\">details</a>",
        linebreaks(&post.text),
        post.id
    ));

    if show_group_link {
        if let (Some(slug), Some(title)) = (&post.group_slug, &post.group_title) {
            html.push_str(&format!(
                " <a class=\"post-group\" href=\"/group/{}/\">all posts of group {}</a>",
                escape(slug),
                escape(title)
            ));
        }
    }

    html.push_str("</article>");
    html
}

fn post_list(page: &Page<Post>, show_group_link: bool) -> String {
    if page.is_empty() {
        return "<p class=\"empty\">No posts yet.</p>".to_string();
    }

    let mut html = String::new();
    for post in &page.items {
        html.push_str(&post_card(post, show_group_link));
        html.push_str("<hr>");
    }
    html.push_str(&paginator(page));
    html
}

fn paginator<T>(page: &Page<T>) -> String {
    if page.num_pages() <= 1 {
        return String::new();
    }

    let mut html = String::from("<nav class=\"pagination\"><ul>");
    if let Some(previous) = page.previous_number() {
        html.push_str("<li><a href=\"?page=1\">&laquo; first</a></li>");
        html.push_str(&format!("<li><a href=\"?page={}\">previous</a></li>", previous));
    }
    html.push_str(&format!(
        "<li class=\"current\">Page {} of {}</li>",
        page.number(),
        page.num_pages()
    ));
    if let Some(next) = page.next_number() {
        html.push_str(&format!("<li><a href=\"?page={}\">next</a></li>", next));
        html.push_str(&format!(
            "<li><a href=\"?page={}\">last &raquo;</a></li>",
            page.num_pages()
        ));
    }
    html.push_str("</ul></nav>");
    html
}

pub fn index_page(page: &Page<Post>, viewer: Option<&AuthUser>) -> String {
    let content = format!("<h1>Latest updates</h1>{}", post_list(page, true));
    layout("Yatube", viewer, &content)
}

pub fn group_page(feed: &GroupFeed, viewer: Option<&AuthUser>) -> String {
    let content = format!(
        "<h1>{}</h1><p class=\"group-description\">{}</p>{}",
        escape(&feed.group.title),
        linebreaks(&feed.group.description),
        post_list(&feed.page, false)
    );
    layout(&format!("Group {}", feed.group.title), viewer, &content)
}

pub fn profile_page(feed: &ProfileFeed, viewer: Option<&AuthUser>) -> String {
    let username = escape(&feed.author.username);
    let follow_button = match viewer {
        Some(user) if user.user_id != feed.author.id => {
            if feed.following {
                format!(
                    "<a class=\"button unfollow\" href=\"/profile/{}/unfollow/\">Unsubscribe</a>",
                    username
                )
            } else {
                format!(
                    "<a class=\"button follow\" href=\"/profile/{}/follow/\">Subscribe</a>",
                    username
                )
            }
        }
        _ => String::new(),
    };

    let content = format!(
        "<h1>All posts of {name}</h1>\
         <h3>Posts: <span class=\"post-count\">{count}</span></h3>\
         {follow_button}\
         {posts}",
        name = escape(feed.author.shown_name()),
        count = feed.post_count,
        posts = post_list(&feed.page, true),
    );
    layout(
        &format!("Profile of {}", feed.author.shown_name()),
        viewer,
        &content,
    )
}

pub fn follow_page(page: &Page<Post>, viewer: Option<&AuthUser>) -> String {
    let content = format!("<h1>Your subscriptions</h1>{}", post_list(page, true));
    layout("Following", viewer, &content)
}

/// Everything the post page shows besides the comment form state.
pub struct PostDetail<'a> {
    pub post: &'a Post,
    pub author_post_count: i64,
    pub comments: &'a [Comment],
}

pub fn post_detail_page(
    detail: &PostDetail<'_>,
    comment_text: &str,
    comment_errors: &FormErrors,
    viewer: Option<&AuthUser>,
) -> String {
    let post = detail.post;
    let mut content = format!(
        "<aside class=\"post-info\"><ul>\
         <li>Date: {date}</li>\
         <li>Author: <a href=\"/profile/{username}/\">{author}</a></li>\
         <li>Posts by author: <span class=\"author-post-count\">{count}</span></li>",
        date = format_date(post.created_at),
        username = escape(&post.author_username),
        author = escape(post.author_name()),
        count = detail.author_post_count,
    );
    if let (Some(slug), Some(title)) = (&post.group_slug, &post.group_title) {
        content.push_str(&format!(
            "<li>Group: <a href=\"/group/{}/\">{}</a></li>",
            escape(slug),
            escape(title)
        ));
    }
    content.push_str("</ul></aside>");

    content.push_str(&format!("<article class=\"post-detail\" data-post-id=\"{}\">", post.id));
    if let Some(url) = &post.image_url {
        content.push_str(&format!(
            "<img class=\"post-image\" src=\"{}\" alt=\"\">",
            escape(url)
        ));
    }
    content.push_str(&format!("<p class=\"post-text\">{}</p>", linebreaks(&post.text)));

    let is_author = viewer.map_or(false, |user| user.user_id == post.author_id);
    if is_author {
        content.push_str(&format!(
            "<a class=\"button\" href=\"/posts/{id}/edit/\">Edit</a>\
             <form method=\"post\" action=\"/posts/{id}/delete/\">\
             <button type=\"submit\">Delete</button></form>",
            id = post.id
        ));
    }
    content.push_str("</article>");

    if viewer.is_some() {
        content.push_str(&format!(
            "<section class=\"comment-form\"><h5>Add a comment:</h5>\
             <form method=\"post\" action=\"/posts/{id}/comment/\">\
             {errors}\
             <textarea name=\"text\" required>{text}</textarea>\
             <button type=\"submit\">Send</button>\
             </form></section>",
            id = post.id,
            errors = field_errors(comment_errors, "text"),
            text = escape(comment_text),
        ));
    }

    content.push_str("<section class=\"comments\">");
    for comment in detail.comments {
        content.push_str(&format!(
            "<div class=\"comment\" data-comment-id=\"{id}\">\
             <h5><a href=\"/profile/{username}/\">{username}</a></h5>\
             <p>{text}</p></div>",
            id = comment.id,
            username = escape(&comment.author_username),
            text = linebreaks(&comment.text),
        ));
    }
    content.push_str("</section>");

    let snippet: String = post.text.chars().take(30).collect();
    layout(&format!("Post {}", snippet), viewer, &content)
}

/// Values echoed back into the post form.
pub struct PostFormView<'a> {
    pub editing: Option<&'a Post>,
    pub text: &'a str,
    pub group: Option<&'a str>,
    pub errors: &'a FormErrors,
}

pub fn post_form_page(form: &PostFormView<'_>, groups: &[Group], viewer: Option<&AuthUser>) -> String {
    let (heading, action, submit) = match form.editing {
        Some(post) => ("Edit post", format!("/posts/{}/edit/", post.id), "Save"),
        None => ("New post", "/create/".to_string(), "Add"),
    };

    let mut options = String::from("<option value=\"\">---------</option>");
    for group in groups {
        let id = group.id.to_string();
        let selected = if form.group == Some(id.as_str()) {
            " selected"
        } else {
            ""
        };
        options.push_str(&format!(
            "<option value=\"{}\"{}>{}</option>",
            id,
            selected,
            escape(&group.title)
        ));
    }

    let current_image = form
        .editing
        .and_then(|post| post.image_url.as_deref())
        .map(|url| {
            format!(
                "<p class=\"current-image\">Currently: <a href=\"{0}\">{0}</a> \
                 <input type=\"checkbox\" name=\"image-clear\" id=\"image-clear_id\">\
                 <label for=\"image-clear_id\">Clear</label></p>",
                escape(url)
            )
        })
        .unwrap_or_default();

    let content = format!(
        "<h1>{heading}</h1>\
         <form method=\"post\" action=\"{action}\" enctype=\"multipart/form-data\">\
         <label for=\"id_text\">Text</label>{text_errors}\
         <textarea name=\"text\" id=\"id_text\" required>{text}</textarea>\
         <label for=\"id_group\">Group</label>{group_errors}\
         <select name=\"group\" id=\"id_group\">{options}</select>\
         <label for=\"id_image\">Image</label>{image_errors}{current_image}\
         <input type=\"file\" name=\"image\" id=\"id_image\" accept=\"image/*\">\
         <button type=\"submit\">{submit}</button>\
         </form>",
        text_errors = field_errors(form.errors, "text"),
        text = escape(form.text),
        group_errors = field_errors(form.errors, "group"),
        image_errors = field_errors(form.errors, "image"),
    );
    layout(heading, viewer, &content)
}

pub fn login_page(username: &str, next: Option<&str>, failed: bool) -> String {
    let error = if failed {
        "<p class=\"errorlist\">Please enter a correct username and password. \
         Note that both fields may be case-sensitive.</p>"
    } else {
        ""
    };
    let next_field = next
        .map(|next| format!("<input type=\"hidden\" name=\"next\" value=\"{}\">", escape(next)))
        .unwrap_or_default();

    let content = format!(
        "<h1>Log in</h1>{error}\
         <form method=\"post\" action=\"/auth/login/\">{next_field}\
         <label for=\"id_username\">Username</label>\
         <input type=\"text\" name=\"username\" id=\"id_username\" value=\"{username}\" required>\
         <label for=\"id_password\">Password</label>\
         <input type=\"password\" name=\"password\" id=\"id_password\" required>\
         <button type=\"submit\">Log in</button>\
         </form>",
        username = escape(username),
    );
    layout("Log in", None, &content)
}

pub struct SignupFormView<'a> {
    pub username: &'a str,
    pub display_name: &'a str,
    pub email: &'a str,
    pub errors: &'a FormErrors,
}

pub fn signup_page(form: &SignupFormView<'_>) -> String {
    let content = format!(
        "<h1>Sign up</h1>\
         <form method=\"post\" action=\"/auth/signup/\">\
         <label for=\"id_username\">Username</label>{username_errors}\
         <input type=\"text\" name=\"username\" id=\"id_username\" value=\"{username}\" required>\
         <label for=\"id_display_name\">Name</label>\
         <input type=\"text\" name=\"display_name\" id=\"id_display_name\" value=\"{display_name}\">\
         <label for=\"id_email\">Email</label>{email_errors}\
         <input type=\"email\" name=\"email\" id=\"id_email\" value=\"{email}\">\
         <label for=\"id_password\">Password</label>{password_errors}\
         <input type=\"password\" name=\"password\" id=\"id_password\" required>\
         <label for=\"id_password_confirm\">Password confirmation</label>{confirm_errors}\
         <input type=\"password\" name=\"password_confirm\" id=\"id_password_confirm\" required>\
         <button type=\"submit\">Sign up</button>\
         </form>",
        username_errors = field_errors(form.errors, "username"),
        username = escape(form.username),
        display_name = escape(form.display_name),
        email_errors = field_errors(form.errors, "email"),
        email = escape(form.email),
        password_errors = field_errors(form.errors, "password"),
        confirm_errors = field_errors(form.errors, "password_confirm"),
    );
    layout("Sign up", None, &content)
}

pub fn logged_out_page() -> String {
    layout(
        "Logged out",
        None,
        "<h1>You have been logged out</h1><p><a href=\"/auth/login/\">Log in again</a></p>",
    )
}

pub fn about_author_page(viewer: Option<&AuthUser>) -> String {
    layout(
        "About the author",
        viewer,
        "<h1>About the author</h1>\
         <p>Yatube is a small community blog: write posts, join groups, \
         comment, and subscribe to the authors you like.</p>",
    )
}

pub fn about_tech_page(viewer: Option<&AuthUser>) -> String {
    layout(
        "Technologies",
        viewer,
        "<h1>Technologies</h1>\
         <ul><li>Rust, tokio and axum</li>\
         <li>PostgreSQL through sqlx</li>\
         <li>Redis page cache</li>\
         <li>S3-compatible image storage</li></ul>",
    )
}

pub fn error_page(status: StatusCode, message: &str) -> String {
    let heading = match status {
        StatusCode::NOT_FOUND => "Page not found",
        StatusCode::FORBIDDEN => "Access denied",
        StatusCode::BAD_REQUEST => "Bad request",
        StatusCode::CONFLICT => "Conflict",
        _ => "Something went wrong",
    };
    let content = format!(
        "<h1>{} <small>{}</small></h1><p class=\"error-message\">{}</p>\
         <p><a href=\"/\">Back to the home page</a></p>",
        status.as_u16(),
        heading,
        escape(message)
    );
    layout(heading, None, &content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::pagination::PageWindow;
    use uuid::Uuid;

    fn post(text: &str) -> Post {
        Post {
            id: Uuid::new_v4(),
            author_id: Uuid::new_v4(),
            author_username: "leo".to_string(),
            author_display_name: String::new(),
            group_id: None,
            group_slug: Some("cats".to_string()),
            group_title: Some("Cats & Co".to_string()),
            text: text.to_string(),
            image_key: None,
            image_url: None,
            created_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn escapes_markup() {
        assert_eq!(
            escape("<script>alert('x') & \"y\"</script>"),
            "&lt;script&gt;alert(&#x27;x&#x27;) &amp; &quot;y&quot;&lt;/script&gt;"
        );
    }

    #[test]
    fn post_text_is_escaped_with_line_breaks() {
        let html = post_card(&post("<b>hi</b>\nthere"), true);
        assert!(html.contains("&lt;b&gt;hi&lt;/b&gt;<br>there"));
        assert!(html.contains("all posts of group Cats &amp; Co"));
        assert!(html.contains("Date: 01.01.1970 00:00"));
    }

    #[test]
    fn group_link_can_be_hidden() {
        let html = post_card(&post("hi"), false);
        assert!(!html.contains("post-group"));
    }

    #[test]
    fn paginator_only_when_needed() {
        let single = Page::new(vec![post("a")], PageWindow::resolve(None, 1, 10));
        assert_eq!(paginator(&single), "");

        let middle = Page::new(vec![post("a")], PageWindow::resolve(Some("2"), 25, 10));
        let html = paginator(&middle);
        assert!(html.contains("?page=1"));
        assert!(html.contains("?page=3"));
        assert!(html.contains("Page 2 of 3"));
    }

    #[test]
    fn field_errors_render_per_field() {
        let mut errors = FormErrors::default();
        errors.add("text", "This field is required.");
        assert!(field_errors(&errors, "text").contains("This field is required."));
        assert_eq!(field_errors(&errors, "group"), "");
    }

    #[test]
    fn edit_form_offers_clearing_an_existing_image() {
        fn render(editing: &Post) -> String {
            let errors = FormErrors::default();
            let form = PostFormView {
                editing: Some(editing),
                text: "hi",
                group: None,
                errors: &errors,
            };
            post_form_page(&form, &[], None)
        }

        let mut editing = post("hi");
        assert!(!render(&editing).contains("image-clear"));

        editing.image_url = Some("http://media/cat.gif".to_string());
        assert!(render(&editing).contains("name=\"image-clear\""));
    }

    #[test]
    fn error_page_mentions_status() {
        let html = error_page(StatusCode::NOT_FOUND, "post not found");
        assert!(html.contains("404"));
        assert!(html.contains("Page not found"));
    }
}
