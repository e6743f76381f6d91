#[derive(uniffi::Enum, Debug, Clone)]
pub enum AppAction {
    // Viewer
    SetViewer {
        user_id: Option<String>,
    },

    // Group view
    OpenGroup {
        group_id: String,
    },
    CloseGroup,

    // Composer
    UpdateDraft {
        text: String,
    },
    SelectAttachment {
        path: String,
        mime_type: Option<String>,
    },
    ClearAttachment,
    SendMessage {
        text: String,
    },
    ClearSendError,

    // UI
    ClearToast,

    // Lifecycle
    Foregrounded,
}

impl AppAction {
    /// Log-safe action tag (never includes draft text or file paths).
    pub fn tag(&self) -> &'static str {
        match self {
            // Viewer
            AppAction::SetViewer { .. } => "SetViewer",

            // Group view
            AppAction::OpenGroup { .. } => "OpenGroup",
            AppAction::CloseGroup => "CloseGroup",

            // Composer
            AppAction::UpdateDraft { .. } => "UpdateDraft",
            AppAction::SelectAttachment { .. } => "SelectAttachment",
            AppAction::ClearAttachment => "ClearAttachment",
            AppAction::SendMessage { .. } => "SendMessage",
            AppAction::ClearSendError => "ClearSendError",

            // UI
            AppAction::ClearToast => "ClearToast",

            // Lifecycle
            AppAction::Foregrounded => "Foregrounded",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::AppAction;

    #[test]
    fn tags_do_not_leak_payloads() {
        let action = AppAction::SendMessage {
            text: "meet at the north gate".to_string(),
        };
        assert_eq!(action.tag(), "SendMessage");
        assert!(!action.tag().contains("north"));

        let action = AppAction::SelectAttachment {
            path: "/home/me/secret.png".to_string(),
            mime_type: None,
        };
        assert_eq!(action.tag(), "SelectAttachment");
    }
}
