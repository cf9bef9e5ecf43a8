use actix_service::{self, Transform};
use actix_web::{
    dev::{Service, ServiceRequest, ServiceResponse},
    Error, HttpMessage,
};
use futures::{
    future::{ready, LocalBoxFuture, Ready},
    FutureExt,
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use std::{rc::Rc, str::FromStr};
use tracing::debug;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    Admin,
    Caregiver,
}

/// Claims carried by the platform's access tokens.
#[derive(Debug, Serialize, Deserialize)]
pub struct ActorClaims {
    pub aud: String,
    pub exp: i64,
    pub iss: String,
    pub sub: String,
    pub name: String,
    pub role: ActorRole,
    #[serde(default)]
    pub homes: Option<Vec<String>>,
}

/// The authenticated caller of an incident operation.
#[derive(Clone, Debug)]
pub struct Actor {
    pub id: ObjectId,
    pub name: String,
    pub is_admin: bool,
    /// Homes a home-scoped actor may see. `None` means not home-scoped.
    pub home_ids: Option<Vec<ObjectId>>,
    pub source_address: Option<String>,
}

pub type ActorAuthentication = Rc<Actor>;

pub struct ActorAuthenticationMiddleware<S> {
    service: Rc<S>,
    key: Rc<DecodingKey>,
    validation: Rc<Validation>,
}
#[derive(Clone)]
pub struct ActorAuthenticationMiddlewareFactory {
    key: Rc<DecodingKey>,
    validation: Rc<Validation>,
}

impl Actor {
    pub fn from_claims(claims: ActorClaims) -> Option<Actor> {
        let id = ObjectId::from_str(&claims.sub).ok()?;
        let home_ids = match claims.homes {
            Some(homes) => {
                let mut home_ids: Vec<ObjectId> = Vec::new();
                for home in homes.iter() {
                    home_ids.push(ObjectId::from_str(home).ok()?);
                }
                Some(home_ids)
            }
            None => None,
        };

        Some(Actor {
            id,
            name: claims.name,
            is_admin: claims.role == ActorRole::Admin,
            home_ids,
            source_address: None,
        })
    }
    pub fn can_access_home(&self, home_id: &ObjectId) -> bool {
        match &self.home_ids {
            Some(home_ids) => home_ids.contains(home_id),
            None => true,
        }
    }
}

impl ActorAuthenticationMiddlewareFactory {
    pub fn new(key: DecodingKey, issuer: &str, audience: &str) -> Self {
        let mut validation: Validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[issuer]);
        validation.set_audience(&[audience]);

        ActorAuthenticationMiddlewareFactory {
            key: Rc::new(key),
            validation: Rc::new(validation),
        }
    }
}

fn verify(token: &str, key: &DecodingKey, validation: &Validation) -> Option<Actor> {
    match decode::<ActorClaims>(token, key, validation) {
        Ok(data) => Actor::from_claims(data.claims),
        Err(error) => {
            debug!("rejected bearer token: {}", error);
            None
        }
    }
}

impl<S, B> Service<ServiceRequest> for ActorAuthenticationMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    actix_service::forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let srv: Rc<S> = self.service.clone();
        let key: Rc<DecodingKey> = self.key.clone();
        let validation: Rc<Validation> = self.validation.clone();

        async move {
            let bearer_token = req
                .headers()
                .get("Authorization")
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.strip_prefix("Bearer "))
                .map(|value| value.trim().to_string());

            if let Some(token) = bearer_token {
                if let Some(mut actor) = verify(&token, &key, &validation) {
                    actor.source_address = req
                        .connection_info()
                        .realip_remote_addr()
                        .map(|address| address.to_string());
                    req.extensions_mut()
                        .insert::<ActorAuthentication>(Rc::new(actor));
                }
            }
            let res: ServiceResponse<B> = srv.call(req).await?;
            Ok(res)
        }
        .boxed_local()
    }
}
impl<S, B> Transform<S, ServiceRequest> for ActorAuthenticationMiddlewareFactory
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = ActorAuthenticationMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(ActorAuthenticationMiddleware {
            service: Rc::new(service),
            key: self.key.clone(),
            validation: self.validation.clone(),
        }))
    }
}
