//! Authentication collaborator and the sign-up / sign-in screens.

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use shared::domain::UserId;
use tracing::info;

use crate::{
    coordinator::{Action, CallContext, Coordinator, Dispatch, DispatchPolicy},
    error::{ClientError, ErrorInfo},
    feedback::{Feedback, FeedbackMessages},
    profile::PictureUpload,
    session::{AuthedUser, SessionAuthority, SessionGate},
    state::StateReader,
    validation, AuthBackend,
};

/// Sole writer of the session: every sign-in, sign-out and profile refresh goes through here.
pub struct Authenticator {
    backend: Arc<dyn AuthBackend>,
    authority: SessionAuthority,
}

impl Authenticator {
    pub fn new(backend: Arc<dyn AuthBackend>) -> Self {
        let (_, authority) = SessionGate::new();
        Self { backend, authority }
    }

    pub fn gate(&self) -> SessionGate {
        self.authority.gate().clone()
    }

    pub fn backend(&self) -> &Arc<dyn AuthBackend> {
        &self.backend
    }

    /// Creates the account without signing in.
    pub async fn sign_up(&self, credentials: &Credentials) -> Result<UserId, ClientError> {
        let user_id = self
            .backend
            .sign_up(credentials.email(), &credentials.password)
            .await?;
        info!(user_id = user_id.0, "auth: account created");
        Ok(user_id)
    }

    pub async fn sign_in(&self, credentials: &Credentials) -> Result<AuthedUser, ClientError> {
        let profile = self
            .backend
            .sign_in(credentials.email(), &credentials.password)
            .await?;
        let user = AuthedUser::new(profile);
        info!(user_id = user.user_id.0, "auth: signed in");
        self.authority.establish(user.clone());
        Ok(user)
    }

    pub fn sign_out(&self) {
        info!("auth: signed out");
        self.authority.end();
    }

    /// Uploads the picture and refreshes the session's profile with its url.
    /// Uploads the picture and, if session `epoch` is still current, shows
    /// the new url in the session profile.
    pub async fn update_profile_picture(
        &self,
        user: &AuthedUser,
        epoch: u64,
        upload: &PictureUpload,
    ) -> Result<String, ClientError> {
        let url = self
            .backend
            .update_profile_picture(user.user_id, upload.mime_type(), upload.bytes())
            .await?;
        let mut profile = user.profile.clone();
        profile.picture_url = Some(url.clone());
        self.authority.update_profile(epoch, profile);
        Ok(url)
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    email: String,
    password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }

    pub fn email(&self) -> &str {
        self.email.trim()
    }

    pub fn validate(&self) -> Result<(), ErrorInfo> {
        validation::validate_credentials(&self.email, &self.password)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

pub struct SignUp {
    auth: Arc<Authenticator>,
}

#[async_trait]
impl Action for SignUp {
    type Input = Credentials;
    type Output = UserId;

    const KIND: &'static str = "sign_up";
    const POLICY: DispatchPolicy = DispatchPolicy::IgnoreWhileLoading;

    fn validate(&self, input: &Credentials) -> Result<(), ErrorInfo> {
        input.validate()
    }

    async fn execute(&self, _ctx: &CallContext, input: &Credentials) -> Result<UserId, ClientError> {
        self.auth.sign_up(input).await
    }
}

pub struct SignIn {
    auth: Arc<Authenticator>,
}

#[async_trait]
impl Action for SignIn {
    type Input = Credentials;
    type Output = AuthedUser;

    const KIND: &'static str = "sign_in";
    const POLICY: DispatchPolicy = DispatchPolicy::IgnoreWhileLoading;

    fn validate(&self, input: &Credentials) -> Result<(), ErrorInfo> {
        input.validate()
    }

    async fn execute(
        &self,
        _ctx: &CallContext,
        input: &Credentials,
    ) -> Result<AuthedUser, ClientError> {
        self.auth.sign_in(input).await
    }
}

pub struct SignUpController {
    submit: Coordinator<SignUp>,
}

impl SignUpController {
    pub fn new(auth: Arc<Authenticator>) -> Self {
        Self {
            submit: Coordinator::new(SignUp { auth }),
        }
    }

    pub fn submit(&self, email: &str, password: &str) -> Dispatch {
        self.submit.dispatch(Credentials::new(email, password))
    }

    pub fn state(&self) -> StateReader<UserId> {
        self.submit.state()
    }

    pub fn feedback(&self) -> Feedback {
        Feedback::from_state(&self.submit.current(), &FeedbackMessages::SIGN_UP)
    }
}

pub struct SignInController {
    submit: Coordinator<SignIn>,
}

impl SignInController {
    pub fn new(auth: Arc<Authenticator>) -> Self {
        Self {
            submit: Coordinator::new(SignIn { auth }),
        }
    }

    pub fn submit(&self, email: &str, password: &str) -> Dispatch {
        self.submit.dispatch(Credentials::new(email, password))
    }

    pub fn state(&self) -> StateReader<AuthedUser> {
        self.submit.state()
    }

    pub fn feedback(&self) -> Feedback {
        Feedback::from_state(&self.submit.current(), &FeedbackMessages::SIGN_IN)
    }
}
