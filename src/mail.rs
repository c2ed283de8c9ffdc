use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart};
use lettre::{Message, SmtpTransport, Transport};
use log::*;

use crate::error::{AppError, AppResult};

/**
 * Anything that can deliver a built message. Sending blocks, so callers run
 * it on a blocking task.
 */
pub trait Mailer: Send + Sync {
    fn send(&self, message: &Message) -> AppResult<()>;
}

/**
 * Plain SMTP relay, the equivalent of a local MTA on port 25
 */
pub struct SmtpMailer {
    transport: SmtpTransport,
}

impl SmtpMailer {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            transport: SmtpTransport::builder_dangerous(host).port(port).build(),
        }
    }
}

impl Mailer for SmtpMailer {
    fn send(&self, message: &Message) -> AppResult<()> {
        self.transport
            .send(message)
            .map(|response| debug!("SMTP accepted message: {:?}", response.code()))
            .map_err(|e| AppError::Mail(e.to_string()))
    }
}

pub struct Outgoing {
    pub subject: String,
    pub from: Mailbox,
    pub to: Vec<Mailbox>,
    pub text: String,
    pub html: String,
    /// Raw bytes, attached as `image.jpeg`
    pub attachment: Option<Vec<u8>>,
}

impl Outgoing {
    pub fn build(self) -> AppResult<Message> {
        let mut builder = Message::builder().from(self.from).subject(self.subject);
        for to in self.to {
            builder = builder.to(to);
        }

        let alternative = MultiPart::alternative_plain_html(self.text, self.html);
        let body = match self.attachment {
            Some(bytes) => {
                let jpeg = ContentType::parse("image/jpeg").map_err(|e| AppError::Mail(e.to_string()))?;
                MultiPart::mixed()
                    .multipart(alternative)
                    .singlepart(Attachment::new("image.jpeg".to_string()).body(bytes, jpeg))
            }
            None => alternative,
        };

        builder.multipart(body).map_err(|e| AppError::Mail(e.to_string()))
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn outgoing(attachment: Option<Vec<u8>>) -> Outgoing {
        Outgoing {
            subject: "Weekly poll".into(),
            from: "Polls <polls@example.com>".parse().unwrap(),
            to: vec![
                "a@example.com".parse().unwrap(),
                "b@example.com".parse().unwrap(),
            ],
            text: "Temp Body".into(),
            html: "<p>Temp Body</p>".into(),
            attachment,
        }
    }

    #[test]
    fn builds_alternative_message() {
        let message = outgoing(None).build().unwrap();
        assert_eq!(message.envelope().to().len(), 2);

        let raw = String::from_utf8_lossy(&message.formatted()).to_string();
        assert!(raw.contains("Subject: Weekly poll"));
        assert!(raw.contains("multipart/alternative"));
        assert!(!raw.contains("image.jpeg"));
    }

    #[test]
    fn attachment_is_named_image_jpeg() {
        let message = outgoing(Some(vec![0xff, 0xd8, 0xff])).build().unwrap();
        let raw = String::from_utf8_lossy(&message.formatted()).to_string();
        assert!(raw.contains("multipart/mixed"));
        assert!(raw.contains("image.jpeg"));
    }
}
