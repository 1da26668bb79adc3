// src/services/auth.rs

use jsonwebtoken::{decode, DecodingKey, Validation};

use crate::{
    common::error::AppError,
    db::UserRepository,
    models::auth::{Claims, User},
};

/// Decodifica e valida (assinatura e expiração) o token emitido pelo
/// serviço de contas.
pub fn decode_claims(token: &str, secret: &str) -> Result<Claims, AppError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::InvalidToken)?;

    Ok(token_data.claims)
}

#[derive(Clone)]
pub struct AuthService {
    user_repo: UserRepository,
    jwt_secret: String,
}

impl AuthService {
    pub fn new(user_repo: UserRepository, jwt_secret: String) -> Self {
        Self { user_repo, jwt_secret }
    }

    pub async fn validate_token(&self, token: &str) -> Result<User, AppError> {
        let claims = decode_claims(token, &self.jwt_secret)?;

        let user = self
            .user_repo
            .find_by_id(claims.sub)
            .await?
            .ok_or(AppError::InvalidToken)?;

        // Conta desativada perde o acesso mesmo com token ainda válido
        if !user.is_active {
            tracing::warn!(user_id = %user.id, "Token de usuário inativo recusado");
            return Err(AppError::InvalidToken);
        }

        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use uuid::Uuid;

    fn token(secret: &str, exp_offset_secs: i64) -> (Uuid, String) {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: Uuid::new_v4(),
            exp: (now + exp_offset_secs) as usize,
            iat: now as usize,
        };
        let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap();
        (claims.sub, token)
    }

    #[test]
    fn valid_token_yields_subject() {
        let (sub, token) = token("segredo", 3600);
        let claims = decode_claims(&token, "segredo").unwrap();
        assert_eq!(claims.sub, sub);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let (_, token) = token("segredo", 3600);
        assert!(matches!(decode_claims(&token, "outro"), Err(AppError::InvalidToken)));
    }

    #[test]
    fn expired_token_is_rejected() {
        let (_, token) = token("segredo", -3600);
        assert!(matches!(decode_claims(&token, "segredo"), Err(AppError::InvalidToken)));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(matches!(decode_claims("nao-e-um-jwt", "segredo"), Err(AppError::InvalidToken)));
    }
}
