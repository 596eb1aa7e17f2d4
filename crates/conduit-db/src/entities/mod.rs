//! Database entities

pub mod article;
pub mod article_tag;
pub mod comment;
pub mod favorite;
pub mod follow;
pub mod profile;
pub mod tag;
pub mod user;

pub use article::Entity as Article;
pub use article_tag::Entity as ArticleTag;
pub use comment::Entity as Comment;
pub use favorite::Entity as Favorite;
pub use follow::Entity as Follow;
pub use profile::Entity as Profile;
pub use tag::Entity as Tag;
pub use user::Entity as User;

pub mod prelude {
    pub use super::article::Entity as Article;
    pub use super::article_tag::Entity as ArticleTag;
    pub use super::comment::Entity as Comment;
    pub use super::favorite::Entity as Favorite;
    pub use super::follow::Entity as Follow;
    pub use super::profile::Entity as Profile;
    pub use super::tag::Entity as Tag;
    pub use super::user::Entity as User;
}
