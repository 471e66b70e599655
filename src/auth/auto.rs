use super::{AuthError, AuthenticationService, GameProfile, Property};
use crate::logger::{log, LogSeverity::*};
use futures::future::BoxFuture;

/// Which provider completed the last login.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthType {
    Primary,
    Secondary,
}

/// Logs in with the primary provider and falls back to the secondary one
/// when the primary rejects the credentials. Every other operation goes to
/// whichever provider succeeded, or to the secondary before any login.
pub struct AutoAuthenticationService<P, S> {
    username: Option<String>,
    password: Option<String>,
    primary: P,
    secondary: S,
    auth_type: Option<AuthType>,
}

impl<P: AuthenticationService, S: AuthenticationService> AutoAuthenticationService<P, S> {
    pub fn new(primary: P, secondary: S) -> Self {
        AutoAuthenticationService {
            username: None,
            password: None,
            primary,
            secondary,
            auth_type: None,
        }
    }

    pub fn auth_type(&self) -> Option<AuthType> {
        self.auth_type
    }

    fn active(&self) -> &dyn AuthenticationService {
        match self.auth_type {
            Some(AuthType::Primary) => &self.primary,
            _ => &self.secondary,
        }
    }

    fn active_mut(&mut self) -> &mut dyn AuthenticationService {
        match self.auth_type {
            Some(AuthType::Primary) => &mut self.primary,
            _ => &mut self.secondary,
        }
    }

    async fn login_with_fallback(&mut self) -> Result<(), AuthError> {
        log("Attempting primary authentication".to_owned(), Info);
        self.primary.set_username(self.username.clone());
        self.primary.set_password(self.password.clone());
        match self.primary.login().await {
            Ok(()) => {
                self.auth_type = Some(AuthType::Primary);
                log("Authenticated with the primary provider".to_owned(), Info);
                Ok(())
            }
            Err(AuthError::InvalidCredentials) => {
                log(
                    "Primary authentication rejected the credentials, trying the secondary provider"
                        .to_owned(),
                    Warning,
                );
                self.secondary.set_username(self.username.clone());
                self.secondary.set_password(self.password.clone());
                self.secondary.login().await?;
                self.auth_type = Some(AuthType::Secondary);
                log("Authenticated with the secondary provider".to_owned(), Info);
                Ok(())
            }
            Err(err) => Err(err),
        }
    }
}

impl<P: AuthenticationService, S: AuthenticationService> AuthenticationService
    for AutoAuthenticationService<P, S>
{
    fn login(&mut self) -> BoxFuture<'_, Result<(), AuthError>> {
        Box::pin(self.login_with_fallback())
    }

    fn logout(&mut self) -> BoxFuture<'_, Result<(), AuthError>> {
        self.active_mut().logout()
    }

    fn access_token(&self) -> Option<&str> {
        self.active().access_token()
    }

    fn set_access_token(&mut self, access_token: Option<String>) {
        self.active_mut().set_access_token(access_token)
    }

    fn is_logged_in(&self) -> bool {
        self.active().is_logged_in()
    }

    fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    fn set_username(&mut self, username: Option<String>) {
        self.username = username;
    }

    fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    fn set_password(&mut self, password: Option<String>) {
        self.password = password;
    }

    fn properties(&self) -> &[Property] {
        self.active().properties()
    }

    fn available_profiles(&self) -> &[GameProfile] {
        self.active().available_profiles()
    }

    fn selected_profile(&self) -> Option<&GameProfile> {
        self.active().selected_profile()
    }
}
