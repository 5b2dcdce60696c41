//! Profile screen: picture upload for the signed-in user.

use std::sync::Arc;

use async_trait::async_trait;
use shared::domain::UserProfile;

use crate::{
    auth::Authenticator,
    coordinator::{Action, CallContext, Coordinator, Dispatch, DispatchPolicy},
    error::{ClientError, ErrorInfo},
    feedback::{Feedback, FeedbackMessages},
    session::SessionGate,
    state::StateReader,
    validation,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PictureUpload {
    bytes: Vec<u8>,
    mime_type: Option<&'static str>,
}

impl PictureUpload {
    pub fn new(bytes: Vec<u8>) -> Self {
        let mime_type = validation::supported_mime(&bytes);
        Self { bytes, mime_type }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime_type(&self) -> &'static str {
        self.mime_type.unwrap_or("application/octet-stream")
    }

    pub fn validate(&self) -> Result<(), ErrorInfo> {
        validation::validate_picture(&self.bytes)
    }
}

pub struct UpdateProfilePicture {
    auth: Arc<Authenticator>,
}

#[async_trait]
impl Action for UpdateProfilePicture {
    type Input = PictureUpload;
    type Output = String;

    const KIND: &'static str = "update_profile_picture";
    const POLICY: DispatchPolicy = DispatchPolicy::IgnoreWhileLoading;

    fn validate(&self, input: &PictureUpload) -> Result<(), ErrorInfo> {
        input.validate()
    }

    async fn execute(&self, ctx: &CallContext, input: &PictureUpload) -> Result<String, ClientError> {
        let (user, epoch) = ctx.require_session()?;
        self.auth.update_profile_picture(user, epoch, input).await
    }
}

pub struct ProfileController {
    upload: Coordinator<UpdateProfilePicture>,
    gate: SessionGate,
}

impl ProfileController {
    pub fn new(auth: Arc<Authenticator>) -> Self {
        let gate = auth.gate();
        Self {
            upload: Coordinator::bound(UpdateProfilePicture { auth }, &gate),
            gate,
        }
    }

    /// Whether the upload trigger is offered at all.
    pub fn can_edit(&self) -> bool {
        self.gate.is_authed()
    }

    pub fn profile(&self) -> Option<UserProfile> {
        self.gate.authed_user().map(|user| user.profile)
    }

    pub fn upload_picture(&self, bytes: Vec<u8>) -> Dispatch {
        self.upload.dispatch(PictureUpload::new(bytes))
    }

    pub fn state(&self) -> StateReader<String> {
        self.upload.state()
    }

    pub fn feedback(&self) -> Feedback {
        Feedback::from_state(&self.upload.current(), &FeedbackMessages::PROFILE_PICTURE)
    }
}
