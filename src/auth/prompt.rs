//! Prompt configuration passed in by the caller.
//!
//! Both flavours travel with every call; each backend picks the one that
//! matches the platform it models.

use serde::{Deserialize, Serialize};

use crate::policy::StorePolicy;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AndroidPromptInfo {
    pub title: String,
    pub subtitle: Option<String>,
    pub description: Option<String>,
    pub negative_button: String,
    pub confirmation_required: bool,
}

impl Default for AndroidPromptInfo {
    fn default() -> Self {
        Self {
            title: "Authenticate to unlock data".into(),
            subtitle: None,
            description: None,
            negative_button: "Cancel".into(),
            confirmation_required: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IosPromptInfo {
    pub save_title: String,
    pub access_title: String,
}

impl Default for IosPromptInfo {
    fn default() -> Self {
        Self {
            save_title: "Unlock to save data".into(),
            access_title: "Unlock to access data".into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PromptInfo {
    pub android_prompt_info: AndroidPromptInfo,
    pub ios_prompt_info: IosPromptInfo,
}

/// Why the prompt is being shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purpose {
    Read,
    Write,
}

/// Everything the platform prompt needs to render itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthRequest {
    pub store: String,
    pub title: String,
    pub subtitle: Option<String>,
    pub description: Option<String>,
    pub negative_button: String,
    pub confirmation_required: bool,
    pub allow_device_credential: bool,
}

impl AuthRequest {
    /// Request rendered from the Android prompt settings.
    pub fn android(store: &str, prompt: &PromptInfo, policy: &StorePolicy) -> Self {
        let info = &prompt.android_prompt_info;
        Self {
            store: store.to_string(),
            title: info.title.clone(),
            subtitle: info.subtitle.clone(),
            description: info.description.clone(),
            negative_button: info.negative_button.clone(),
            confirmation_required: info.confirmation_required,
            allow_device_credential: !policy.biometric_only,
        }
    }

    /// Request rendered from the Apple prompt settings.
    pub fn darwin(store: &str, prompt: &PromptInfo, policy: &StorePolicy, purpose: Purpose) -> Self {
        let info = &prompt.ios_prompt_info;
        let title = match purpose {
            Purpose::Read => info.access_title.clone(),
            Purpose::Write => info.save_title.clone(),
        };
        Self {
            store: store.to_string(),
            title,
            subtitle: None,
            description: None,
            negative_button: "Cancel".into(),
            confirmation_required: false,
            allow_device_credential: !policy.biometric_only,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let prompt: PromptInfo =
            serde_json::from_str(r#"{"androidPromptInfo":{"title":"Unlock notes"}}"#).unwrap();
        assert_eq!(prompt.android_prompt_info.title, "Unlock notes");
        assert_eq!(prompt.android_prompt_info.negative_button, "Cancel");
        assert!(prompt.android_prompt_info.confirmation_required);
        assert_eq!(prompt.ios_prompt_info.access_title, "Unlock to access data");
    }

    #[test]
    fn darwin_title_follows_purpose() {
        let prompt = PromptInfo::default();
        let policy = StorePolicy::from_options(true, true, Some(5));

        let read = AuthRequest::darwin("s", &prompt, &policy, Purpose::Read);
        let write = AuthRequest::darwin("s", &prompt, &policy, Purpose::Write);
        assert_eq!(read.title, "Unlock to access data");
        assert_eq!(write.title, "Unlock to save data");
        assert!(!read.allow_device_credential);
    }
}
