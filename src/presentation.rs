//! # Presentation Builders
//!
//! Pure functions turning session state into transport-neutral prompts.
//! Nothing here performs I/O; identical input renders identical output.

use crate::callback::CallbackAction;
use crate::localization::{t_args_lang, t_lang};
use crate::model::{FaceId, SavedFace, SwapRecord};
use crate::session::{PageStep, SearchSession, SessionId};

const RESULT_COLUMNS: usize = 3;
const MAX_LABEL_CHARS: usize = 24;

/// What a button does when pressed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ButtonTarget {
    Callback(CallbackAction),
    Link(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub target: ButtonTarget,
}

impl Button {
    pub fn callback(label: impl Into<String>, action: CallbackAction) -> Self {
        Self {
            label: label.into(),
            target: ButtonTarget::Callback(action),
        }
    }

    pub fn link(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            target: ButtonTarget::Link(url.into()),
        }
    }
}

/// Text plus a grid of buttons, rendered by the transport
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Prompt {
    pub text: String,
    pub keyboard: Vec<Vec<Button>>,
}

impl Prompt {
    /// A prompt without buttons; editing to it removes the keyboard
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            keyboard: Vec::new(),
        }
    }
}

/// A labelled choice bound to a callback action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Choice {
    pub label: String,
    pub action: CallbackAction,
}

impl Choice {
    fn button(&self) -> Button {
        Button::callback(self.label.clone(), self.action.clone())
    }
}

/// One rendered page of search results
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultPage {
    pub text: String,
    pub choices: Vec<Choice>,
    pub navigation: Vec<Choice>,
}

impl ResultPage {
    pub fn to_prompt(&self) -> Prompt {
        let mut keyboard: Vec<Vec<Button>> = self
            .choices
            .chunks(RESULT_COLUMNS)
            .map(|row| row.iter().map(Choice::button).collect())
            .collect();
        keyboard.push(self.navigation.iter().map(Choice::button).collect());
        Prompt {
            text: self.text.clone(),
            keyboard,
        }
    }
}

fn truncate_label(label: &str) -> String {
    if label.chars().count() > MAX_LABEL_CHARS {
        let head: String = label.chars().take(MAX_LABEL_CHARS - 1).collect();
        format!("{head}…")
    } else {
        label.to_string()
    }
}

/// Render the current page of a search session.
///
/// Choice labels are absolute result numbers (1-based); navigation always
/// carries prev, a page counter, next and cancel so the layout does not
/// shift while paging.
pub fn build_result_page(session: &SearchSession) -> ResultPage {
    let language_code = session.language_code.as_deref();
    let page = session.current_page + 1;
    let total = session.total_pages();

    let mut text = t_args_lang(
        "search-results-header",
        &[
            ("query", session.query.as_str()),
            ("page", &page.to_string()),
            ("total", &total.to_string()),
        ],
        language_code,
    );

    let mut choices = Vec::new();
    for index in session.page_range() {
        let result = &session.results[index];
        let title = if result.title.is_empty() {
            t_lang("search-untitled", language_code)
        } else {
            truncate_label(&result.title)
        };
        text.push_str(&format!("\n{}. {} ({})", index + 1, title, result.preview_url));
        choices.push(Choice {
            label: (index + 1).to_string(),
            action: CallbackAction::SearchSelect {
                session: session.id.clone(),
                index,
            },
        });
    }

    let navigation = vec![
        Choice {
            label: "◀️".to_string(),
            action: CallbackAction::SearchPage {
                session: session.id.clone(),
                step: PageStep::Prev,
            },
        },
        Choice {
            label: format!("{page}/{total}"),
            action: CallbackAction::Noop,
        },
        Choice {
            label: "▶️".to_string(),
            action: CallbackAction::SearchPage {
                session: session.id.clone(),
                step: PageStep::Next,
            },
        },
        Choice {
            label: format!("❌ {}", t_lang("cancel", language_code)),
            action: CallbackAction::SearchCancel {
                session: session.id.clone(),
            },
        },
    ];

    ResultPage {
        text,
        choices,
        navigation,
    }
}

/// Face choices for a swap session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaceChoices {
    /// Saved faces, default first
    pub choices: Vec<Choice>,
    pub upload: Choice,
    pub cancel: Choice,
}

impl FaceChoices {
    /// True when there is nothing to pick and only an upload is offered
    pub fn upload_only(&self) -> bool {
        self.choices.is_empty()
    }

    pub fn to_prompt(&self, language_code: Option<&str>) -> Prompt {
        let text = t_lang("swap-choose-face", language_code);
        let mut keyboard: Vec<Vec<Button>> =
            self.choices.iter().map(|choice| vec![choice.button()]).collect();
        keyboard.push(vec![self.upload.button(), self.cancel.button()]);
        Prompt { text, keyboard }
    }
}

/// Order saved faces for display: the default face first and starred,
/// the rest oldest first.
pub fn build_face_choices(
    session_id: &SessionId,
    faces: &[SavedFace],
    default_face_id: Option<FaceId>,
    language_code: Option<&str>,
) -> FaceChoices {
    let mut ordered: Vec<&SavedFace> = faces.iter().collect();
    ordered.sort_by_key(|face| (Some(face.id) != default_face_id, face.created_at, face.id));

    let choices = ordered
        .into_iter()
        .map(|face| {
            let name = truncate_label(&face.name);
            let label = if Some(face.id) == default_face_id {
                format!("⭐ {name}")
            } else {
                name
            };
            Choice {
                label,
                action: CallbackAction::SelectFace {
                    session: session_id.clone(),
                    face_id: face.id,
                },
            }
        })
        .collect();

    FaceChoices {
        choices,
        upload: Choice {
            label: format!("📤 {}", t_lang("swap-upload-new", language_code)),
            action: CallbackAction::UploadFace {
                session: session_id.clone(),
            },
        },
        cancel: Choice {
            label: format!("❌ {}", t_lang("cancel", language_code)),
            action: CallbackAction::SwapCancel {
                session: session_id.clone(),
            },
        },
    }
}

/// Prompt shown while waiting for an uploaded face inside a swap session.
/// `no_saved_faces` switches to the wording for first-time users.
pub fn build_upload_request(
    session_id: &SessionId,
    window_secs: u64,
    no_saved_faces: bool,
    language_code: Option<&str>,
) -> Prompt {
    let minutes = window_secs.div_ceil(60).max(1);
    let key = if no_saved_faces {
        "swap-upload-only"
    } else {
        "swap-send-photo"
    };
    Prompt {
        text: t_args_lang(key, &[("minutes", &minutes.to_string())], language_code),
        keyboard: vec![vec![Button::callback(
            format!("❌ {}", t_lang("cancel", language_code)),
            CallbackAction::SwapCancel {
                session: session_id.clone(),
            },
        )]],
    }
}

/// Saved-face management listing with per-face actions
pub fn build_face_list(
    faces: &[SavedFace],
    default_face_id: Option<FaceId>,
    max_faces: usize,
    language_code: Option<&str>,
) -> Prompt {
    if faces.is_empty() {
        return Prompt::text(t_lang("faces-empty", language_code));
    }

    let mut text = t_args_lang(
        "faces-header",
        &[
            ("count", &faces.len().to_string()),
            ("max", &max_faces.to_string()),
        ],
        language_code,
    );
    let mut keyboard = Vec::new();
    for face in faces {
        let is_default = Some(face.id) == default_face_id;
        let marker = if is_default { "⭐ " } else { "" };
        text.push_str(&format!(
            "\n{marker}{} ({})",
            face.name,
            t_args_lang(
                "faces-usage",
                &[("count", &face.usage_count.to_string())],
                language_code
            )
        ));

        let mut row = Vec::new();
        if !is_default {
            row.push(Button::callback(
                format!("⭐ {}", truncate_label(&face.name)),
                CallbackAction::SetDefaultFace { face_id: face.id },
            ));
        }
        row.push(Button::callback(
            format!("🗑️ {}", truncate_label(&face.name)),
            CallbackAction::DeleteFace { face_id: face.id },
        ));
        keyboard.push(row);
    }

    Prompt { text, keyboard }
}

/// Plain-text listing of recent swaps
pub fn build_history(records: &[SwapRecord], language_code: Option<&str>) -> String {
    if records.is_empty() {
        return t_lang("history-empty", language_code);
    }

    let mut text = t_lang("history-header", language_code);
    for record in records {
        text.push_str(&format!(
            "\n{} · {} · {}",
            record.created_at.format("%Y-%m-%d %H:%M"),
            record.media_kind.as_str(),
            record.result_url
        ));
        if let Some(credits) = record.credits_charged {
            text.push_str(&format!(
                " · {}",
                t_args_lang(
                    "history-credits",
                    &[("credits", &credits.to_string())],
                    language_code
                )
            ));
        }
    }
    text
}
