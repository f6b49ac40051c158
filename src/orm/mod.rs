pub mod comment_likes;
pub mod comments;
pub mod post_likes;
pub mod post_tags;
pub mod posts;
pub mod tags;
pub mod users;
