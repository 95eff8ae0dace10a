//! # Callback Actions
//!
//! Button correlation data is decoded once, at the transport boundary, into
//! a [`CallbackAction`]. Encoding uses short tags and `|` separators; session
//! ids never contain `|`.

use std::fmt;

use crate::model::FaceId;
use crate::session::{PageStep, SessionId};

/// Telegram rejects callback data longer than this
pub const MAX_CALLBACK_DATA_LEN: usize = 64;

const SEPARATOR: char = '|';

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackAction {
    /// Move a search session one page back or forward
    SearchPage { session: SessionId, step: PageStep },
    /// Pick a search result by its absolute index
    SearchSelect { session: SessionId, index: usize },
    SearchCancel { session: SessionId },
    /// Use a saved face for a swap session
    SelectFace { session: SessionId, face_id: FaceId },
    /// Upload a new face for a swap session
    UploadFace { session: SessionId },
    SwapCancel { session: SessionId },
    /// Saved-face management (outside any session)
    SetDefaultFace { face_id: FaceId },
    DeleteFace { face_id: FaceId },
    /// Inert button, e.g. a page counter
    Noop,
}

/// Reasons callback data could not be decoded
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CallbackDecodeError {
    #[error("unknown callback tag: {0}")]
    UnknownTag(String),
    #[error("malformed callback data: {0}")]
    Malformed(String),
}

impl CallbackAction {
    pub fn encode(&self) -> String {
        let fields: Vec<String> = match self {
            CallbackAction::SearchPage { session, step } => vec![
                "sp".into(),
                session.to_string(),
                match step {
                    PageStep::Next => "n".into(),
                    PageStep::Prev => "p".into(),
                },
            ],
            CallbackAction::SearchSelect { session, index } => {
                vec!["ss".into(), session.to_string(), index.to_string()]
            }
            CallbackAction::SearchCancel { session } => vec!["sx".into(), session.to_string()],
            CallbackAction::SelectFace { session, face_id } => {
                vec!["wf".into(), session.to_string(), face_id.to_string()]
            }
            CallbackAction::UploadFace { session } => vec!["wu".into(), session.to_string()],
            CallbackAction::SwapCancel { session } => vec!["wx".into(), session.to_string()],
            CallbackAction::SetDefaultFace { face_id } => vec!["fs".into(), face_id.to_string()],
            CallbackAction::DeleteFace { face_id } => vec!["fd".into(), face_id.to_string()],
            CallbackAction::Noop => vec!["nop".into()],
        };
        fields.join(&SEPARATOR.to_string())
    }

    pub fn decode(data: &str) -> Result<Self, CallbackDecodeError> {
        let malformed = || CallbackDecodeError::Malformed(data.to_string());
        let fields: Vec<&str> = data.split(SEPARATOR).collect();

        let session = |index: usize| -> Result<SessionId, CallbackDecodeError> {
            fields
                .get(index)
                .and_then(|raw| SessionId::parse(raw))
                .ok_or_else(malformed)
        };
        let number = |index: usize| -> Result<i64, CallbackDecodeError> {
            fields
                .get(index)
                .and_then(|raw| raw.parse::<i64>().ok())
                .ok_or_else(malformed)
        };
        let expect_len = |len: usize| -> Result<(), CallbackDecodeError> {
            if fields.len() == len {
                Ok(())
            } else {
                Err(malformed())
            }
        };

        let tag = fields.first().copied().unwrap_or_default();
        match tag {
            "sp" => {
                expect_len(3)?;
                let step = match fields[2] {
                    "n" => PageStep::Next,
                    "p" => PageStep::Prev,
                    _ => return Err(malformed()),
                };
                Ok(CallbackAction::SearchPage {
                    session: session(1)?,
                    step,
                })
            }
            "ss" => {
                expect_len(3)?;
                let index = usize::try_from(number(2)?).map_err(|_| malformed())?;
                Ok(CallbackAction::SearchSelect {
                    session: session(1)?,
                    index,
                })
            }
            "sx" => {
                expect_len(2)?;
                Ok(CallbackAction::SearchCancel {
                    session: session(1)?,
                })
            }
            "wf" => {
                expect_len(3)?;
                Ok(CallbackAction::SelectFace {
                    session: session(1)?,
                    face_id: number(2)?,
                })
            }
            "wu" => {
                expect_len(2)?;
                Ok(CallbackAction::UploadFace {
                    session: session(1)?,
                })
            }
            "wx" => {
                expect_len(2)?;
                Ok(CallbackAction::SwapCancel {
                    session: session(1)?,
                })
            }
            "fs" => {
                expect_len(2)?;
                Ok(CallbackAction::SetDefaultFace {
                    face_id: number(1)?,
                })
            }
            "fd" => {
                expect_len(2)?;
                Ok(CallbackAction::DeleteFace {
                    face_id: number(1)?,
                })
            }
            "nop" => Ok(CallbackAction::Noop),
            other => Err(CallbackDecodeError::UnknownTag(other.to_string())),
        }
    }
}

impl fmt::Display for CallbackAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}
