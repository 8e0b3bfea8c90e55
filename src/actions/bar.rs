use crate::domain::SuggestedAction;

const BUTTONS: [(SuggestedAction, &str); 3] = [
    (SuggestedAction::Archive, "Archive"),
    (SuggestedAction::Reply, "Reply"),
    (SuggestedAction::Forward, "Forward"),
];

/// Archive / Reply / Forward controls shown above the opened message.
///
/// At most one button is emphasized at a time.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ActionBar {
    emphasized: Option<SuggestedAction>,
}

impl ActionBar {
    pub fn emphasize(&mut self, action: SuggestedAction) {
        self.emphasized = Some(action);
    }

    pub fn clear(&mut self) {
        self.emphasized = None;
    }

    pub fn emphasized(&self) -> Option<SuggestedAction> {
        self.emphasized
    }

    /// Button captions, with the shortcut hint on the emphasized one.
    pub fn captions(&self) -> Vec<String> {
        BUTTONS
            .iter()
            .map(|(action, caption)| {
                if self.emphasized == Some(*action) {
                    format!("{caption} (press {})", action.shortcut())
                } else {
                    caption.to_string()
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_latest_suggestion_is_emphasized() {
        let mut bar = ActionBar::default();
        assert_eq!(bar.captions(), vec!["Archive", "Reply", "Forward"]);

        bar.emphasize(SuggestedAction::Reply);
        bar.emphasize(SuggestedAction::Archive);
        assert_eq!(bar.emphasized(), Some(SuggestedAction::Archive));
        assert_eq!(bar.captions(), vec!["Archive (press e)", "Reply", "Forward"]);

        bar.clear();
        assert_eq!(bar.emphasized(), None);
    }
}
