#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use approvals_backend::app_state::AppState;
use approvals_backend::config::Config;
use approvals_backend::db::models::requests::{
    AttributePayload, CreationPayload, DeletionPayload, GroupAction, GroupPayload, NetworkOperation, NetworkPayload,
    PasswordPayload, RequestPayload,
};
use approvals_backend::lifecycle::{ActorContext, EngineSettings, LifecycleEngine};
use approvals_backend::mocks::{MemoryStore, MockDirectory, RecordingNotifier};
use approvals_backend::service::Desk;

pub type TestEngine = LifecycleEngine<MemoryStore, MockDirectory, RecordingNotifier>;

pub const HELPDESK: &str = "helpdesk1";
pub const HELPDESK_EMAIL: &str = "hd.one@corp.example";
pub const APPROVER: &str = "approver1";

pub struct Harness {
    pub store: MemoryStore,
    pub directory: MockDirectory,
    pub notifier: RecordingNotifier,
    pub engine: TestEngine,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(EngineSettings::from_config(&Config::for_tests()))
    }

    pub fn with_directory_timeout(timeout: Duration) -> Self {
        let mut settings = EngineSettings::from_config(&Config::for_tests());
        settings.directory_timeout = timeout;
        Self::with_settings(settings)
    }

    pub fn with_settings(settings: EngineSettings) -> Self {
        let store = MemoryStore::new();
        let directory = MockDirectory::new();
        let notifier = RecordingNotifier::new();

        directory.add_user(HELPDESK, "Help Desk One", Some(HELPDESK_EMAIL));
        directory.add_user(APPROVER, "Approver One", Some("approver1@corp.example"));
        directory.add_user("jsmith", "John Smith", Some("john.smith@corp.example"));

        let engine = LifecycleEngine::new(store.clone(), directory.clone(), notifier.clone(), settings);
        Self { store, directory, notifier, engine }
    }
}

/// Application state over a fresh harness, plus handles to inspect it.
pub fn app_state() -> (AppState, MemoryStore, MockDirectory, RecordingNotifier) {
    let harness = Harness::new();
    let Harness { store, directory, notifier, engine } = harness;
    let state = AppState::new(Arc::new(Desk::new(engine)), Arc::new(Config::for_tests()));
    (state, store, directory, notifier)
}

pub fn helpdesk() -> ActorContext {
    ActorContext::new(HELPDESK).with_ip(Some("10.0.0.12".to_string()))
}

pub fn approver() -> ActorContext {
    ActorContext::new(APPROVER)
}

pub fn creation(username: &str, company_id: i32) -> RequestPayload {
    RequestPayload::Creation(CreationPayload {
        company_id,
        first_name: "Jane".into(),
        last_name: "Doe".into(),
        display_name: None,
        username: username.into(),
        email: None,
        title: Some("Analyst".into()),
        department: None,
        phone: None,
        manager: None,
    })
}

pub fn deletion(username: &str) -> RequestPayload {
    RequestPayload::Deletion(DeletionPayload {
        username: username.into(),
        display_name: None,
        reason: Some("Left the company".into()),
    })
}

pub fn attribute(username: &str, name: &str, value: &str) -> RequestPayload {
    RequestPayload::Attribute(AttributePayload {
        username: username.into(),
        attribute_name: name.into(),
        old_value: None,
        new_value: value.into(),
    })
}

pub fn password(username: &str, email: Option<&str>) -> RequestPayload {
    RequestPayload::Password(PasswordPayload {
        username: username.into(),
        display_name: None,
        email: email.map(str::to_string),
    })
}

pub fn group(username: &str, group_name: &str, action_type: GroupAction) -> RequestPayload {
    RequestPayload::Group(GroupPayload {
        username: username.into(),
        group_name: group_name.into(),
        action_type,
    })
}

pub fn dhcp(hostname: &str, mac: &str, ip: &str) -> RequestPayload {
    RequestPayload::Network(NetworkPayload {
        operation: NetworkOperation::DhcpReservation,
        hostname: hostname.into(),
        ip_address: Some(ip.into()),
        mac_address: Some(mac.into()),
        record_type: None,
        record_value: None,
    })
}
