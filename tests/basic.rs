#[cfg(test)]
mod tests {
    use actix_session::{storage::CookieSessionStore, SessionMiddleware};
    use actix_web::cookie::Key;
    use actix_web::{test, App};
    use rublog::middleware::ClientCtx;

    // Guarded routes must turn away anonymous callers before any handler
    // logic runs, so none of these requests need a database.
    #[actix_rt::test]
    async fn test_guarded_routes_reject_anonymous() {
        let secret_key = Key::generate();
        let app = test::init_service(
            App::new()
                .wrap(ClientCtx::default())
                .wrap(SessionMiddleware::new(
                    CookieSessionStore::default(),
                    secret_key,
                ))
                .configure(rublog::web::configure),
        )
        .await;

        for (method, uri) in [
            (test::TestRequest::post(), "/api/v1/posts"),
            (test::TestRequest::patch(), "/api/v1/posts/1/toggle-like"),
            (test::TestRequest::delete(), "/api/v1/comments/1"),
            (test::TestRequest::post(), "/api/v1/tags?name=rust"),
        ] {
            let req = method
                .uri(uri)
                .set_json(serde_json::json!({
                    "title": "t",
                    "content": "c",
                }))
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status().as_u16(), 401, "{}", uri);
        }
    }
}
