mod auth;
mod comment;
mod post;
mod tag;
mod user;

/// Configures the web app
///
/// @see https://docs.rs/actix-web/4.0.1/actix_web/struct.App.html#method.configure
pub fn configure(conf: &mut actix_web::web::ServiceConfig) {
    conf.service(
        actix_web::web::scope("/api/v1")
            .configure(auth::configure)
            .configure(post::configure)
            .configure(comment::configure)
            .configure(tag::configure)
            .configure(user::configure),
    );
}
