use crate::auth::jwt::verify_token;
use crate::config::Config;
use crate::error::ApiError;
use crate::model::role::Role;
use actix_web::{
    FromRequest, HttpMessage, HttpRequest, dev::Payload, error::ErrorUnauthorized, web::Data,
};
use futures::future::{Ready, ready};

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: u64,
    pub username: String,
    pub role: Role,

    /// Present only if this user is linked to an employee record
    pub employee_id: Option<u64>,
}

impl FromRequest for AuthUser {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        // already verified by auth_middleware
        if let Some(user) = req.extensions().get::<AuthUser>() {
            return ready(Ok(user.clone()));
        }

        let token = match req
            .headers()
            .get("Authorization")
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
        {
            Some(t) => t,
            None => return ready(Err(ErrorUnauthorized("Missing token"))),
        };

        let config = match req.app_data::<Data<Config>>() {
            Some(c) => c,
            None => {
                return ready(Err(actix_web::error::ErrorInternalServerError(
                    "Config missing",
                )));
            }
        };

        let claims = match verify_token(token, &config.jwt_secret) {
            Ok(c) => c,
            Err(_) => return ready(Err(ErrorUnauthorized("Invalid token"))),
        };

        let role = match Role::from_id(claims.role) {
            Some(r) => r,
            None => return ready(Err(ErrorUnauthorized("Invalid role"))),
        };

        ready(Ok(AuthUser {
            user_id: claims.user_id,
            username: claims.sub,
            role,
            employee_id: claims.employee_id,
        }))
    }
}

impl AuthUser {
    pub fn is_hr_or_admin(&self) -> bool {
        matches!(self.role, Role::Admin | Role::Hr)
    }

    /// Employee record behind this user; attendance and requests need one.
    pub fn require_employee(&self) -> Result<u64, ApiError> {
        self.employee_id
            .ok_or(ApiError::Forbidden("No employee profile"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::test_tokens::sign;
    use crate::models::TokenType;
    use actix_web::test::TestRequest;

    fn test_config() -> Config {
        Config {
            database_url: String::new(),
            jwt_secret: "test-secret".into(),
            server_addr: "127.0.0.1:0".into(),
            rate_protected_per_min: 1000,
            rate_checkin_per_min: 10,
            checkin_include_disabled: false,
            permission_cache_ttl_secs: 60,
            permission_cache_capacity: 8,
            api_prefix: "/api".into(),
        }
    }

    #[actix_web::test]
    async fn extracts_user_from_bearer_token() {
        let token = sign(5, 2, Some(50), TokenType::Access, "test-secret");
        let req = TestRequest::default()
            .app_data(Data::new(test_config()))
            .insert_header(("Authorization", format!("Bearer {token}")))
            .to_http_request();

        let user = AuthUser::extract(&req).await.unwrap();
        assert_eq!(user.user_id, 5);
        assert_eq!(user.role, Role::Hr);
        assert!(user.is_hr_or_admin());
        assert_eq!(user.require_employee().unwrap(), 50);
    }

    #[actix_web::test]
    async fn missing_or_bad_tokens_are_unauthorized() {
        let req = TestRequest::default()
            .app_data(Data::new(test_config()))
            .to_http_request();
        assert!(AuthUser::extract(&req).await.is_err());

        let token = sign(5, 2, None, TokenType::Access, "wrong-secret");
        let req = TestRequest::default()
            .app_data(Data::new(test_config()))
            .insert_header(("Authorization", format!("Bearer {token}")))
            .to_http_request();
        assert!(AuthUser::extract(&req).await.is_err());

        let token = sign(5, 42, None, TokenType::Access, "test-secret");
        let req = TestRequest::default()
            .app_data(Data::new(test_config()))
            .insert_header(("Authorization", format!("Bearer {token}")))
            .to_http_request();
        assert!(AuthUser::extract(&req).await.is_err());
    }

    #[actix_web::test]
    async fn user_without_employee_profile_is_forbidden() {
        let token = sign(1, 1, None, TokenType::Access, "test-secret");
        let req = TestRequest::default()
            .app_data(Data::new(test_config()))
            .insert_header(("Authorization", format!("Bearer {token}")))
            .to_http_request();

        let user = AuthUser::extract(&req).await.unwrap();
        assert!(matches!(
            user.require_employee(),
            Err(ApiError::Forbidden("No employee profile"))
        ));
    }
}
