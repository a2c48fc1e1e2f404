use anyhow::Result;
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use crate::app::groups::GroupService;
use crate::app::pagination::{Page, PageWindow};
use crate::app::posts::{post_from_row, PostService, POST_SELECT};
use crate::app::social::SocialService;
use crate::app::users::UserService;
use crate::domain::group::Group;
use crate::domain::post::Post;
use crate::domain::user::User;
use crate::infra::db::Db;

/// Which posts a feed is built from.
#[derive(Debug, Clone, Copy)]
enum PostFilter {
    All,
    Group(Uuid),
    Author(Uuid),
    FollowedBy(Uuid),
}

impl PostFilter {
    fn push_where(self, builder: &mut QueryBuilder<'_, Postgres>) {
        match self {
            Self::All => {}
            Self::Group(group_id) => {
                builder.push(" WHERE p.group_id = ").push_bind(group_id);
            }
            Self::Author(author_id) => {
                builder.push(" WHERE p.author_id = ").push_bind(author_id);
            }
            Self::FollowedBy(user_id) => {
                builder
                    .push(" WHERE p.author_id IN (SELECT author_id FROM follows WHERE user_id = ")
                    .push_bind(user_id)
                    .push(")");
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct GroupFeed {
    pub group: Group,
    pub page: Page<Post>,
}

#[derive(Debug, Clone)]
pub struct ProfileFeed {
    pub author: User,
    pub post_count: i64,
    pub following: bool,
    pub page: Page<Post>,
}

#[derive(Clone)]
pub struct FeedService {
    db: Db,
    page_size: i64,
}

impl FeedService {
    pub fn new(db: Db, page_size: i64) -> Self {
        Self { db, page_size }
    }

    /// Every post, newest first.
    pub async fn global_feed(&self, page: Option<&str>) -> Result<Page<Post>> {
        self.fetch_page(PostFilter::All, page).await
    }

    /// Posts tagged with the group; `None` when the slug is unknown.
    pub async fn group_feed(&self, slug: &str, page: Option<&str>) -> Result<Option<GroupFeed>> {
        let groups = GroupService::new(self.db.clone());
        let Some(group) = groups.find_by_slug(slug).await? else {
            return Ok(None);
        };

        let page = self.fetch_page(PostFilter::Group(group.id), page).await?;
        Ok(Some(GroupFeed { group, page }))
    }

    /// Posts by one author; `None` when the username is unknown.
    ///
    /// Anonymous viewers never hit the follows table.
    pub async fn profile_feed(
        &self,
        username: &str,
        viewer_id: Option<Uuid>,
        page: Option<&str>,
    ) -> Result<Option<ProfileFeed>> {
        let users = UserService::new(self.db.clone());
        let Some(author) = users.find_by_username(username).await? else {
            return Ok(None);
        };

        let page = self.fetch_page(PostFilter::Author(author.id), page).await?;
        let post_count = PostService::new(self.db.clone())
            .count_by_author(author.id)
            .await?;

        let following = match viewer_id {
            Some(viewer_id) => {
                SocialService::new(self.db.clone())
                    .is_following(viewer_id, author.id)
                    .await?
            }
            None => false,
        };

        Ok(Some(ProfileFeed {
            author,
            post_count,
            following,
            page,
        }))
    }

    /// Posts from every author `viewer_id` follows.
    pub async fn follow_feed(&self, viewer_id: Uuid, page: Option<&str>) -> Result<Page<Post>> {
        self.fetch_page(PostFilter::FollowedBy(viewer_id), page).await
    }

    async fn fetch_page(&self, filter: PostFilter, requested: Option<&str>) -> Result<Page<Post>> {
        let mut count_query = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM posts p");
        filter.push_where(&mut count_query);
        let total: i64 = count_query
            .build_query_scalar()
            .fetch_one(self.db.pool())
            .await?;

        let window = PageWindow::resolve(requested, total, self.page_size);

        let mut select = QueryBuilder::<Postgres>::new(POST_SELECT);
        filter.push_where(&mut select);
        select
            .push(" ORDER BY p.created_at DESC, p.id DESC LIMIT ")
            .push_bind(window.limit())
            .push(" OFFSET ")
            .push_bind(window.offset());

        let rows = select.build().fetch_all(self.db.pool()).await?;
        let posts = rows.iter().map(post_from_row).collect();

        Ok(Page::new(posts, window))
    }
}
