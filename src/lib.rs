pub mod comment;
pub mod datetime;
pub mod db;
pub mod error;
pub mod guard;
pub mod like;
pub mod middleware;
pub mod orm;
pub mod post;
pub mod query;
pub mod tag;
pub mod user;
pub mod web;
