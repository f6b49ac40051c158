use crate::db::get_db_pool;
use crate::error::Error as DomainError;
use crate::orm::users;
use crate::user::Viewer;
use actix_session::{Session, SessionExt};
use actix_utils::future::{ok, Ready};
use actix_web::dev::{
    forward_ready, Extensions, Payload, Service, ServiceRequest, ServiceResponse, Transform,
};
use actix_web::{Error, FromRequest, HttpMessage, HttpRequest};
use futures_util::future::{FutureExt as _, LocalBoxFuture};
use sea_orm::EntityTrait;
use std::{cell::RefCell, rc::Rc};

/// Session key holding the authenticated user id.
pub const SESSION_USER_KEY: &str = "uid";

/// Identity data resolved once per request cycle.
#[derive(Clone, Debug, Default)]
pub struct ClientCtxInner {
    pub viewer: Option<Viewer>,
}

/// Caller identity passed to routes. Wraps ClientCtxInner, which is set at
/// the beginning of the request; anonymous requests carry None.
#[derive(Clone, Debug, Default)]
pub struct ClientCtx(Rc<RefCell<ClientCtxInner>>);

impl ClientCtx {
    fn get_client_ctx(extensions: &mut Extensions) -> Self {
        match extensions.get::<Rc<RefCell<ClientCtxInner>>>() {
            // Existing record in extensions; pull it.
            Some(inner) => Self(Rc::clone(inner)),
            // No existing record; create and insert it.
            None => {
                let inner = Rc::new(RefCell::new(ClientCtxInner::default()));
                extensions.insert(inner.clone());
                Self(inner)
            }
        }
    }

    /// The resolved caller identity, if any.
    pub fn viewer(&self) -> Option<Viewer> {
        self.0.borrow().viewer.clone()
    }

    /// Returns either the user's id or None.
    pub fn user_id(&self) -> Option<String> {
        self.0.borrow().viewer.as_ref().map(|v| v.user_id.clone())
    }

    /// The caller identity, or AuthenticationFailed for routes that require one.
    pub fn require_viewer(&self) -> Result<Viewer, DomainError> {
        self.viewer().ok_or(DomainError::AuthenticationFailed)
    }
}

/// Resolves the session cookie into a Viewer. Stale sessions pointing at a
/// user that no longer exists resolve to anonymous.
async fn authenticate_by_session(session: &Session) -> Option<Viewer> {
    let user_id = match session.get::<String>(SESSION_USER_KEY) {
        Ok(Some(user_id)) => user_id,
        Ok(None) => return None,
        Err(e) => {
            log::warn!("unreadable session cookie: {}", e);
            return None;
        }
    };

    match users::Entity::find_by_id(&user_id).one(get_db_pool()).await {
        Ok(Some(user)) => Some(Viewer {
            user_id: user.user_id,
            role: user.role,
        }),
        Ok(None) => None,
        Err(e) => {
            log::error!("identity lookup failed for {:?}: {}", user_id, e);
            None
        }
    }
}

/// This implementation is what actually provides the `client: ClientCtx` in
/// the parameters of route functions.
impl FromRequest for ClientCtx {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ok(ClientCtx::get_client_ctx(&mut req.extensions_mut()))
    }
}

impl<S, B> Transform<S, ServiceRequest> for ClientCtx
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = ClientCtxMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(ClientCtxMiddleware { service })
    }
}

/// Client context middleware
pub struct ClientCtxMiddleware<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for ClientCtxMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let session = req.get_session();
        let ctx = ClientCtx::get_client_ctx(&mut req.extensions_mut());
        let fut = self.service.call(req);

        async move {
            let viewer = authenticate_by_session(&session).await;
            ctx.0.borrow_mut().viewer = viewer;
            fut.await
        }
        .boxed_local()
    }
}
