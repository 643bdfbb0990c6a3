use std::sync::Mutex;

use async_trait::async_trait;

use crate::models::integration::Integration;
use crate::services::messenger::{DirectMessage, Messenger, MessengerError};

/// Recording messenger for tests. Calls are captured in order; failures are
/// opt-in per channel.
#[derive(Default)]
pub struct MockMessenger {
    pub replies: Mutex<Vec<(String, String)>>,
    pub dms: Mutex<Vec<(String, DirectMessage)>>,
    pub fail_replies: bool,
    pub fail_dms: bool,
}

#[async_trait]
impl Messenger for MockMessenger {
    async fn reply_to_comment(
        &self,
        _integration: &Integration,
        comment_id: &str,
        text: &str,
    ) -> Result<(), MessengerError> {
        if self.fail_replies {
            return Err(MessengerError::Api {
                status: 500,
                message: "mock reply failure".into(),
            });
        }
        self.replies
            .lock()
            .expect("reply log lock")
            .push((comment_id.to_string(), text.to_string()));
        Ok(())
    }

    async fn send_direct_message(
        &self,
        _integration: &Integration,
        recipient_id: &str,
        message: &DirectMessage,
    ) -> Result<(), MessengerError> {
        if self.fail_dms {
            return Err(MessengerError::Api {
                status: 500,
                message: "mock dm failure".into(),
            });
        }
        self.dms
            .lock()
            .expect("dm log lock")
            .push((recipient_id.to_string(), message.clone()));
        Ok(())
    }
}
