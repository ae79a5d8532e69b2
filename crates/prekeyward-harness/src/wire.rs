//! Text format of the simulated prekey sub-protocol.
//!
//! Every message starts with [`PREFIX`] so ordinary chat text never parses.
//! Ensembles travel as `<device><+|->`, the sign marking whether the
//! ensemble will pass validation.

/// Marker opening every sub-protocol message.
pub const PREFIX: &str = "?PKW:";

/// One device's simulated prekey material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SimEnsemble {
    /// Device the ensemble belongs to.
    pub device: u32,
    /// Whether validation accepts it.
    pub valid: bool,
}

/// A parsed sub-protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireMessage {
    /// Client asks how many of its prekey messages are stored.
    StatusRequest,
    /// Client publishes profiles and prekey messages.
    Publish {
        /// Includes a client profile.
        client_profile: bool,
        /// Includes a prekey profile.
        prekey_profile: bool,
        /// Fresh prekey messages included.
        prekey_messages: u32,
    },
    /// Client asks for a recipient's ensembles.
    EnsembleRequest {
        /// Bare recipient address.
        recipient: String,
    },
    /// Server reports stored prekey messages.
    Stored(u32),
    /// Server accepted a publication.
    Success,
    /// Server rejected a publication.
    Failure,
    /// Server could not process a message.
    Error(i32),
    /// Server returns a recipient's ensembles.
    Ensembles {
        /// Bare recipient address.
        recipient: String,
        /// One per device.
        ensembles: Vec<SimEnsemble>,
    },
    /// Server holds nothing for a recipient.
    Empty {
        /// Bare recipient address.
        recipient: String,
    },
}

impl WireMessage {
    /// Render with the sub-protocol prefix.
    pub fn encode(&self) -> String {
        let body = match self {
            Self::StatusRequest => "STATUS?".to_string(),
            Self::Publish { client_profile, prekey_profile, prekey_messages } => format!(
                "PUBLISH:{}:{}:{prekey_messages}",
                u8::from(*client_profile),
                u8::from(*prekey_profile)
            ),
            Self::EnsembleRequest { recipient } => format!("ENSEMBLES?{recipient}"),
            Self::Stored(count) => format!("STORED:{count}"),
            Self::Success => "SUCCESS".to_string(),
            Self::Failure => "FAILURE".to_string(),
            Self::Error(code) => format!("ERROR:{code}"),
            Self::Ensembles { recipient, ensembles } => {
                let list: Vec<String> = ensembles
                    .iter()
                    .map(|e| format!("{}{}", e.device, if e.valid { '+' } else { '-' }))
                    .collect();
                format!("ENSEMBLES:{recipient}:{}", list.join(","))
            },
            Self::Empty { recipient } => format!("EMPTY:{recipient}"),
        };
        format!("{PREFIX}{body}")
    }

    /// Parse a message body. `None` for anything outside the sub-protocol.
    pub fn parse(text: &str) -> Option<Self> {
        let body = text.strip_prefix(PREFIX)?;

        if body == "STATUS?" {
            return Some(Self::StatusRequest);
        }
        if let Some(recipient) = body.strip_prefix("ENSEMBLES?") {
            return Some(Self::EnsembleRequest { recipient: recipient.to_string() });
        }

        let (verb, rest) = body.split_once(':').unwrap_or((body, ""));
        match verb {
            "PUBLISH" => {
                let mut fields = rest.split(':');
                let client_profile = fields.next()? == "1";
                let prekey_profile = fields.next()? == "1";
                let prekey_messages = fields.next()?.parse().ok()?;
                Some(Self::Publish { client_profile, prekey_profile, prekey_messages })
            },
            "STORED" => Some(Self::Stored(rest.parse().ok()?)),
            "SUCCESS" => Some(Self::Success),
            "FAILURE" => Some(Self::Failure),
            "ERROR" => Some(Self::Error(rest.parse().ok()?)),
            "ENSEMBLES" => {
                let (recipient, list) = rest.rsplit_once(':')?;
                let ensembles = list
                    .split(',')
                    .filter(|entry| !entry.is_empty())
                    .map(parse_ensemble)
                    .collect::<Option<Vec<_>>>()?;
                Some(Self::Ensembles { recipient: recipient.to_string(), ensembles })
            },
            "EMPTY" => Some(Self::Empty { recipient: rest.to_string() }),
            _ => None,
        }
    }
}

fn parse_ensemble(entry: &str) -> Option<SimEnsemble> {
    let (device, valid) = match entry.strip_suffix('+') {
        Some(device) => (device, true),
        None => (entry.strip_suffix('-')?, false),
    };
    Some(SimEnsemble { device: device.parse().ok()?, valid })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensembles_survive_encoding() {
        let message = WireMessage::Ensembles {
            recipient: "bob@example.org".into(),
            ensembles: vec![
                SimEnsemble { device: 1, valid: true },
                SimEnsemble { device: 2, valid: false },
            ],
        };
        let text = message.encode();

        assert_eq!(text, "?PKW:ENSEMBLES:bob@example.org:1+,2-");
        assert_eq!(WireMessage::parse(&text), Some(message));
    }

    #[test]
    fn chat_text_is_not_protocol() {
        assert_eq!(WireMessage::parse("SUCCESS"), None);
        assert_eq!(WireMessage::parse("hello"), None);
        assert_eq!(WireMessage::parse("?PKW:BOGUS"), None);
        assert_eq!(WireMessage::parse("?PKW:STORED:many"), None);
    }

    #[test]
    fn publish_flags() {
        let text = "?PKW:PUBLISH:1:0:100";
        assert_eq!(
            WireMessage::parse(text),
            Some(WireMessage::Publish {
                client_profile: true,
                prekey_profile: false,
                prekey_messages: 100
            })
        );
    }
}
