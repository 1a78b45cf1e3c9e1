use std::sync::Arc;

use chrono::Utc;
use url::Url;

use crate::crypto::{PasswordManager, random_token};
use crate::error::{Result, ServerError};
use crate::mail::{Mail, Mailer};
use crate::token::{Principal, TokenKind, TokenManager, TokenPair};
use crate::user::{PublicUser, User, UserRepository};

/// Verification token length, in bytes.
pub const VERIFY_TOKEN_LENGTH: usize = 16;
const VERIFICATION_PATH: &str = "account/verification";

/// Result of a successful login.
#[derive(Debug)]
pub struct Session {
    pub tokens: TokenPair,
    pub user: PublicUser,
}

/// Registration, verification and login.
#[derive(Clone)]
pub struct UserService {
    repo: Arc<dyn UserRepository>,
    pwd: Arc<PasswordManager>,
    tokens: TokenManager,
    mail: Arc<dyn Mailer>,
    website: Url,
}

impl UserService {
    /// Create a new [`UserService`].
    pub fn new(
        repo: Arc<dyn UserRepository>,
        pwd: Arc<PasswordManager>,
        tokens: TokenManager,
        mail: Arc<dyn Mailer>,
        website: &str,
    ) -> std::result::Result<Self, url::ParseError> {
        Ok(Self {
            repo,
            pwd,
            tokens,
            mail,
            website: Url::parse(website)?,
        })
    }

    fn verification_link(&self, user: &User, token: &str) -> Result<Url> {
        let mut link = self
            .website
            .join(VERIFICATION_PATH)
            .map_err(|err| ServerError::Internal {
                details: "cannot build verification link".into(),
                source: Some(Box::new(err)),
            })?;
        link.query_pairs_mut()
            .append_pair("email", &user.email)
            .append_pair("token", token);

        Ok(link)
    }

    /// Register a new inactive account and mail its verification link.
    pub async fn create(&self, email: &str, password: &str) -> Result<PublicUser> {
        if self.repo.find_by_email(email).await?.is_some() {
            return Err(ServerError::AccountConflict);
        }

        let verify_token = random_token(VERIFY_TOKEN_LENGTH);
        let user = User::new(email, self.pwd.hash_password(password)?, verify_token.clone());
        self.repo.insert(&user).await?;

        let link = self.verification_link(&user, &verify_token)?;
        self.mail
            .send(Mail::verification(&user.email, link.as_str()))
            .await?;

        tracing::info!(user_id = %user.id, "account created");
        Ok(user.public())
    }

    /// Activate an account with its one-time verification token.
    pub async fn verify_account(&self, email: &str, token: &str) -> Result<PublicUser> {
        let mut user = self
            .repo
            .find_by_email(email)
            .await?
            .ok_or(ServerError::AccountNotFound)?;

        if user.is_active {
            return Err(ServerError::AccountAlreadyActive);
        }
        if user.verify_token.as_deref() != Some(token) {
            return Err(ServerError::VerificationMismatch);
        }

        user.is_active = true;
        user.verify_token = None;
        user.updated_at = Some(Utc::now());
        self.repo.update(&user).await?;

        tracing::info!(user_id = %user.id, "account verified");
        Ok(user.public())
    }

    /// Check credentials and issue an access and a refresh token.
    pub async fn login(&self, email: &str, password: &str) -> Result<Session> {
        let user = self
            .repo
            .find_by_email(email)
            .await?
            .ok_or(ServerError::AccountNotFound)?;

        if !user.is_active {
            return Err(ServerError::AccountInactive);
        }
        self.pwd.verify_password(password, &user.password)?;

        let tokens = self.tokens.create_pair(&user.principal())?;

        tracing::info!(user_id = %user.id, "user logged in");
        Ok(Session {
            tokens,
            user: user.public(),
        })
    }

    /// Exchange a refresh token for a new access token.
    pub fn refresh(&self, refresh_token: &str) -> Result<String> {
        let principal = self
            .tokens
            .decode(TokenKind::Refresh, refresh_token)
            .map_err(|err| {
                tracing::debug!(error = %err, "refresh token rejected");
                ServerError::RefreshRejected
            })?;

        Ok(self.tokens.create(TokenKind::Access, &principal)?)
    }

    /// Public profile of an authenticated principal.
    pub async fn profile(&self, principal: &Principal) -> Result<PublicUser> {
        self.repo
            .find_by_id(&principal.id)
            .await?
            .map(|user| user.public())
            .ok_or(ServerError::AccountNotFound)
    }
}
