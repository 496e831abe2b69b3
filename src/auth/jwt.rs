use crate::models::{Claims, TokenType};
use jsonwebtoken::{DecodingKey, Validation, decode};

/// Decodes and validates a bearer token. Only access tokens are accepted for
/// API calls; refresh tokens are handled by the identity service.
pub fn verify_token(token: &str, secret: &str) -> Result<Claims, String> {
    let claims = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| e.to_string())?;

    if claims.token_type != TokenType::Access {
        return Err("refresh tokens cannot be used for API calls".to_string());
    }

    Ok(claims)
}


#[cfg(test)]
mod tests {
    use super::test_tokens::sign;
    use super::*;

    #[test]
    fn accepts_access_tokens() {
        let token = sign(9, 3, Some(90), TokenType::Access, "s3cret");
        let claims = verify_token(&token, "s3cret").unwrap();
        assert_eq!(claims.user_id, 9);
        assert_eq!(claims.employee_id, Some(90));
    }

    #[test]
    fn ignores_claims_it_does_not_use() {
        use jsonwebtoken::{EncodingKey, Header, encode};

        let exp = jsonwebtoken::get_current_timestamp() + 600;
        let token = encode(
            &Header::default(),
            &serde_json::json!({
                "user_id": 4,
                "sub": "user4",
                "role": 2,
                "exp": exp,
                "jti": "0b9f6d2e-issued-elsewhere",
                "token_type": "Access",
                "employee_id": null
            }),
            &EncodingKey::from_secret(b"s3cret"),
        )
        .unwrap();

        let claims = verify_token(&token, "s3cret").unwrap();
        assert_eq!(claims.user_id, 4);
        assert_eq!(claims.employee_id, None);
    }

    #[test]
    fn rejects_refresh_tokens_and_bad_signatures() {
        let refresh = sign(9, 3, None, TokenType::Refresh, "s3cret");
        assert!(verify_token(&refresh, "s3cret").is_err());

        let access = sign(9, 3, None, TokenType::Access, "s3cret");
        assert!(verify_token(&access, "other").is_err());
    }
}
