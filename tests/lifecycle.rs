mod common;

use std::time::{Duration, Instant};

use chrono::Utc;

use approvals_backend::config::Config;
use approvals_backend::db::models::requests::{GroupAction, RequestKind, RequestPayload, RequestStatus};
use approvals_backend::directory::DirectoryError;
use approvals_backend::lifecycle::{ActorContext, EngineSettings, LifecycleError, NotActionable, Transition, ValidationError};
use approvals_backend::mocks::{DirectoryCall, Notification};

use common::*;

fn completed(transition: Transition) -> approvals_backend::db::models::requests::RequestRecord {
    match transition {
        Transition::Completed(record) => record,
        Transition::NotActionable(reason) => panic!("expected a completed transition, got {reason:?}"),
    }
}

#[tokio::test]
async fn creation_request_is_numbered_and_pending() {
    let h = Harness::new();

    let created = h.engine.create(creation("jdoe", 1), &helpdesk()).await.unwrap();

    assert_eq!(created.kind, RequestKind::Creation);
    assert_eq!(created.request_number, format!("CRT-{}0001", Utc::now().format("%Y")));

    let stored = h.store.request(RequestKind::Creation, created.id).await.unwrap();
    assert_eq!(stored.status, RequestStatus::Pending);
    assert_eq!(stored.approved_by_id, None);

    let audit = h.store.activity_for(RequestKind::Creation, created.id).await;
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].action, "Account creation request created");
    assert_eq!(audit[0].ip_address.as_deref(), Some("10.0.0.12"));

    assert_eq!(
        h.notifier.sent(),
        vec![Notification::NewRequest {
            kind: RequestKind::Creation,
            request_number: created.request_number.clone(),
            request_id: created.id,
        }]
    );
}

#[tokio::test]
async fn approving_a_creation_creates_the_account_and_mails_credentials() {
    let h = Harness::new();
    let created = h.engine.create(creation("jdoe", 1), &helpdesk()).await.unwrap();

    let record = completed(h.engine.approve(RequestKind::Creation, created.id, &approver()).await.unwrap());
    assert_eq!(record.status, RequestStatus::Approved);

    let stored = h.store.request(RequestKind::Creation, created.id).await.unwrap();
    assert_eq!(stored.status, RequestStatus::Approved);
    assert!(stored.approved_by_id.is_some());
    assert!(stored.approved_date.is_some());

    let account = h.directory.created_account("jdoe").unwrap();
    assert_eq!(account.container, "OU=Staff,DC=corp,DC=local");
    assert_eq!(account.display_name, "Jane Doe");
    assert_eq!(account.email, "jdoe@corp.local");
    assert!(h.directory.mutations().contains(&DirectoryCall::ForcePasswordChange("jdoe".into())));

    let approved_rows: Vec<_> = h
        .store
        .activity_for(RequestKind::Creation, created.id)
        .await
        .into_iter()
        .filter(|a| a.action == "Account creation request approved")
        .collect();
    assert_eq!(approved_rows.len(), 1);

    assert_eq!(
        h.notifier.approvals(),
        vec![Notification::Approval {
            email: HELPDESK_EMAIL.into(),
            username: HELPDESK.into(),
            request_number: created.request_number.clone(),
            approved: true,
            reason: None,
        }]
    );
    let password = h.directory.password_of("jdoe").unwrap();
    assert!(h.notifier.sent().contains(&Notification::Credentials {
        email: HELPDESK_EMAIL.into(),
        username: "jdoe".into(),
        password,
    }));
}

#[tokio::test]
async fn creation_uses_the_company_container() {
    let h = Harness::new();
    let company = h.store.add_company("Contoso", Some("OU=Contoso,DC=corp,DC=local"), true).await;

    let created = h.engine.create(creation("cuser", company.id), &helpdesk()).await.unwrap();
    h.engine.approve(RequestKind::Creation, created.id, &approver()).await.unwrap();

    let account = h.directory.created_account("cuser").unwrap();
    assert_eq!(account.container, "OU=Contoso,DC=corp,DC=local");
    assert_eq!(account.company.as_deref(), Some("Contoso"));
}

#[tokio::test]
async fn rejected_request_is_terminal() {
    let h = Harness::new();
    let created = h.engine.create(password("jsmith", None), &helpdesk()).await.unwrap();

    let record = completed(
        h.engine
            .reject(RequestKind::Password, created.id, "test", &approver())
            .await
            .unwrap(),
    );
    assert_eq!(record.status, RequestStatus::Rejected);
    assert_eq!(record.rejection_reason.as_deref(), Some("test"));

    let closed = h.store.request(RequestKind::Password, created.id).await.unwrap();
    assert_eq!(closed.status, RequestStatus::Rejected);

    let again = h.engine.reject(RequestKind::Password, created.id, "other", &approver()).await.unwrap();
    assert_eq!(again, Transition::NotActionable(NotActionable::AlreadyProcessed(RequestStatus::Rejected)));
    let approve = h.engine.approve(RequestKind::Password, created.id, &approver()).await.unwrap();
    assert_eq!(approve, Transition::NotActionable(NotActionable::AlreadyProcessed(RequestStatus::Rejected)));

    assert_eq!(h.store.request(RequestKind::Password, created.id).await.unwrap(), closed);
    assert!(h.directory.mutations().is_empty());
    assert_eq!(
        h.notifier.approvals(),
        vec![Notification::Approval {
            email: HELPDESK_EMAIL.into(),
            username: HELPDESK.into(),
            request_number: created.request_number,
            approved: false,
            reason: Some("test".into()),
        }]
    );
}

#[tokio::test]
async fn approved_request_cannot_be_rejected() {
    let h = Harness::new();
    h.directory.add_user("jdoe", "Jane Doe", None);
    let created = h.engine.create(deletion("jdoe"), &helpdesk()).await.unwrap();
    h.engine.approve(RequestKind::Deletion, created.id, &approver()).await.unwrap();
    let approved = h.store.request(RequestKind::Deletion, created.id).await.unwrap();

    let outcome = h.engine.reject(RequestKind::Deletion, created.id, "too late", &approver()).await.unwrap();

    assert_eq!(outcome, Transition::NotActionable(NotActionable::AlreadyProcessed(RequestStatus::Approved)));
    assert_eq!(h.store.request(RequestKind::Deletion, created.id).await.unwrap(), approved);
    assert_eq!(h.directory.is_enabled("jdoe"), Some(false));
}

#[tokio::test]
async fn removing_a_non_member_is_a_successful_no_op() {
    let h = Harness::new();
    h.directory.add_user("jdoe", "Jane Doe", None);
    h.directory.add_group("VPN Users");
    let created = h
        .engine
        .create(group("jdoe", "VPN Users", GroupAction::Remove), &helpdesk())
        .await
        .unwrap();

    let record = completed(h.engine.approve(RequestKind::Group, created.id, &approver()).await.unwrap());

    assert_eq!(record.status, RequestStatus::Approved);
    assert!(h
        .directory
        .calls()
        .contains(&DirectoryCall::IsMemberOfGroup("jdoe".into(), "VPN Users".into())));
    assert!(h.directory.mutations().is_empty());
}

#[tokio::test]
async fn adding_a_member_updates_the_group() {
    let h = Harness::new();
    h.directory.add_user("jdoe", "Jane Doe", None);
    h.directory.add_group("VPN Users");
    let created = h
        .engine
        .create(group("jdoe", "VPN Users", GroupAction::Add), &helpdesk())
        .await
        .unwrap();

    h.engine.approve(RequestKind::Group, created.id, &approver()).await.unwrap();

    assert!(h.directory.is_member("jdoe", "VPN Users"));
    assert!(created.request_number.starts_with(&format!("GRP{}", Utc::now().format("%Y%m%d"))));
}

#[tokio::test]
async fn concurrent_approvals_close_the_request_once() {
    let h = Harness::new();
    h.directory.add_user("jdoe", "Jane Doe", None);
    let created = h.engine.create(deletion("jdoe"), &helpdesk()).await.unwrap();

    let first = ActorContext::new("approver1");
    let second = ActorContext::new("approver2");
    let (a, b) = tokio::join!(
        h.engine.approve(RequestKind::Deletion, created.id, &first),
        h.engine.approve(RequestKind::Deletion, created.id, &second),
    );
    let outcomes = [a.unwrap(), b.unwrap()];

    assert_eq!(outcomes.iter().filter(|t| t.is_completed()).count(), 1);
    assert!(outcomes
        .iter()
        .any(|t| *t == Transition::NotActionable(NotActionable::AlreadyProcessed(RequestStatus::Approved))));
    assert_eq!(h.directory.mutations(), vec![DirectoryCall::DisableUser("jdoe".into())]);

    let approvals = h
        .store
        .activity_for(RequestKind::Deletion, created.id)
        .await
        .into_iter()
        .filter(|a| a.action.ends_with("approved"))
        .count();
    assert_eq!(approvals, 1);
    assert_eq!(h.notifier.approvals().len(), 1);
}

#[tokio::test]
async fn sequential_numbers_are_distinct_and_increasing() {
    let h = Harness::new();
    let mut numbers = Vec::new();
    for i in 0..12 {
        let created = h.engine.create(deletion(&format!("user{i}")), &helpdesk()).await.unwrap();
        numbers.push(created.request_number);
    }

    let year = Utc::now().format("%Y").to_string();
    assert_eq!(numbers[0], format!("DEL-{year}0001"));
    assert_eq!(numbers[11], format!("DEL-{year}0012"));
    assert!(numbers.windows(2).all(|pair| {
        approvals_backend::numbering::counter_of(&pair[0]) < approvals_backend::numbering::counter_of(&pair[1])
    }));
}

#[tokio::test]
async fn password_numbers_use_their_own_layout() {
    let h = Harness::new();
    let first = h.engine.create(password("jsmith", None), &helpdesk()).await.unwrap();
    let second = h.engine.create(password("jsmith", None), &helpdesk()).await.unwrap();

    let year = Utc::now().format("%Y");
    assert_eq!(first.request_number, format!("PWD-{year}-00001"));
    assert_eq!(second.request_number, format!("PWD-{year}-00002"));
}

#[tokio::test]
async fn failed_directory_action_leaves_the_request_pending() {
    let h = Harness::new();
    h.directory.add_user("jdoe", "Jane Doe", None);
    let created = h.engine.create(deletion("jdoe"), &helpdesk()).await.unwrap();
    h.directory
        .fail_mutations(Some(DirectoryError::OperationFailed("insufficient rights".into())));

    let err = h.engine.approve(RequestKind::Deletion, created.id, &approver()).await.unwrap_err();

    assert!(err.is_retryable());
    assert!(matches!(
        &err,
        LifecycleError::DirectoryActionFailed { request_number, .. } if *request_number == created.request_number
    ));
    let stored = h.store.request(RequestKind::Deletion, created.id).await.unwrap();
    assert_eq!(stored.status, RequestStatus::Pending);
    assert_eq!(stored.approved_by_id, None);
    assert!(h
        .store
        .activity_for(RequestKind::Deletion, created.id)
        .await
        .iter()
        .all(|a| !a.action.ends_with("approved")));
    assert!(h.notifier.approvals().is_empty());

    h.directory.fail_mutations(None);
    let retried = h.engine.approve(RequestKind::Deletion, created.id, &approver()).await.unwrap();
    assert!(retried.is_completed());
}

#[tokio::test]
async fn slow_directory_action_times_out_and_rolls_back() {
    let h = Harness::with_directory_timeout(Duration::from_millis(50));
    h.directory.add_user("jdoe", "Jane Doe", None);
    let created = h.engine.create(deletion("jdoe"), &helpdesk()).await.unwrap();
    h.directory.delay_mutations(Some(Duration::from_secs(2)));

    let err = h.engine.approve(RequestKind::Deletion, created.id, &approver()).await.unwrap_err();

    assert!(matches!(
        err,
        LifecycleError::DirectoryActionFailed { source: DirectoryError::Timeout(_), .. }
    ));
    let stored = h.store.request(RequestKind::Deletion, created.id).await.unwrap();
    assert_eq!(stored.status, RequestStatus::Pending);
}

#[tokio::test]
async fn creation_fails_when_the_account_already_exists() {
    let h = Harness::new();
    let created = h.engine.create(creation("jsmith", 1), &helpdesk()).await.unwrap();

    let err = h.engine.approve(RequestKind::Creation, created.id, &approver()).await.unwrap_err();

    assert!(matches!(err, LifecycleError::DirectoryActionFailed { .. }));
    assert_eq!(
        h.store.request(RequestKind::Creation, created.id).await.unwrap().status,
        RequestStatus::Pending
    );
    assert!(h.directory.mutations().is_empty());
}

#[tokio::test]
async fn every_transition_writes_one_matching_audit_row() {
    let h = Harness::new();
    let created = h.engine.create(password("jsmith", None), &helpdesk()).await.unwrap();
    h.engine
        .reject(RequestKind::Password, created.id, "Caller could not be verified", &approver())
        .await
        .unwrap();

    let audit = h.store.activity_for(RequestKind::Password, created.id).await;
    let actions: Vec<_> = audit.iter().map(|a| a.action.as_str()).collect();
    assert_eq!(actions, ["Password reset request created", "Password reset request rejected"]);
    assert!(audit.iter().all(|a| a.entity_id == created.id && a.entity_type == "PasswordResetRequest"));
    assert_eq!(
        audit[1].details.as_deref(),
        Some(format!("{}: Caller could not be verified", created.request_number).as_str())
    );
    assert_eq!(h.store.activity().await.len(), 2);
}

#[tokio::test]
async fn unknown_requester_is_stored_once() {
    let h = Harness::new();

    h.engine.create(deletion("olduser1"), &ActorContext::new("NewTech")).await.unwrap();
    h.engine.create(deletion("olduser2"), &ActorContext::new(" newtech ")).await.unwrap();

    let users: Vec<_> = h
        .store
        .users()
        .await
        .into_iter()
        .filter(|u| u.username == "newtech")
        .collect();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].email, "newtech@corp.local");
}

#[tokio::test]
async fn notification_failures_do_not_undo_transitions() {
    let h = Harness::new();
    h.directory.add_user("jdoe", "Jane Doe", None);
    h.notifier.fail(true);

    let created = h.engine.create(deletion("jdoe"), &helpdesk()).await.unwrap();
    let outcome = h.engine.approve(RequestKind::Deletion, created.id, &approver()).await.unwrap();

    assert!(outcome.is_completed());
    assert_eq!(
        h.store.request(RequestKind::Deletion, created.id).await.unwrap().status,
        RequestStatus::Approved
    );
    assert_eq!(h.notifier.sent().len(), 2);
}

#[tokio::test]
async fn stalled_mail_relay_does_not_hold_up_transitions() {
    let mut settings = EngineSettings::from_config(&Config::for_tests());
    settings.notification_timeout = Duration::from_millis(50);
    let h = Harness::with_settings(settings);
    h.directory.add_user("jdoe", "Jane Doe", None);
    h.notifier.stall(Some(Duration::from_secs(30)));

    let started = Instant::now();
    let created = h.engine.create(deletion("jdoe"), &helpdesk()).await.unwrap();
    let outcome = h.engine.approve(RequestKind::Deletion, created.id, &approver()).await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(outcome.is_completed());
    assert_eq!(
        h.store.request(RequestKind::Deletion, created.id).await.unwrap().status,
        RequestStatus::Approved
    );
    assert_eq!(h.notifier.sent().len(), 2);
}

#[tokio::test]
async fn attribute_change_records_the_old_value_and_tells_the_owner() {
    let h = Harness::new();
    h.directory.set_attribute("jsmith", "title", "Engineer");

    let created = h
        .engine
        .create(attribute("jsmith", "Title", "Senior Engineer"), &helpdesk())
        .await
        .unwrap();
    let stored = h.store.request(RequestKind::Attribute, created.id).await.unwrap();
    let RequestPayload::Attribute(payload) = &stored.payload else {
        panic!("expected an attribute payload");
    };
    assert_eq!(payload.attribute_name, "title");
    assert_eq!(payload.old_value.as_deref(), Some("Engineer"));

    h.engine.approve(RequestKind::Attribute, created.id, &approver()).await.unwrap();

    assert_eq!(h.directory.attribute("jsmith", "title").as_deref(), Some("Senior Engineer"));
    assert!(h.notifier.sent().contains(&Notification::AttributeChange {
        email: "john.smith@corp.example".into(),
        username: "jsmith".into(),
        attribute: "title".into(),
        new_value: "Senior Engineer".into(),
        approved: true,
    }));
}

#[tokio::test]
async fn password_reset_mails_the_new_password() {
    let h = Harness::new();
    let created = h.engine.create(password("jsmith", None), &helpdesk()).await.unwrap();

    h.engine.approve(RequestKind::Password, created.id, &approver()).await.unwrap();

    let password = h.directory.password_of("jsmith").unwrap();
    assert_eq!(password.chars().count(), 14);
    assert!(h.notifier.sent().contains(&Notification::Credentials {
        email: "john.smith@corp.example".into(),
        username: "jsmith".into(),
        password,
    }));
}

#[tokio::test]
async fn network_requests_close_without_directory_changes() {
    let h = Harness::new();
    let created = h
        .engine
        .create(dhcp("prn-042", "00-1a-2b-3c-4d-5e", "10.0.4.20"), &helpdesk())
        .await
        .unwrap();

    let record = completed(h.engine.approve(RequestKind::Network, created.id, &approver()).await.unwrap());

    assert_eq!(record.status, RequestStatus::Approved);
    assert!(h.directory.mutations().is_empty());
    assert!(created.request_number.starts_with("NET"));
}

#[tokio::test]
async fn invalid_requests_never_reach_the_store() {
    let h = Harness::new();
    let inactive = h.store.add_company("Dissolved Ltd", None, false).await;

    let unknown = h.engine.create(creation("jdoe", 99), &helpdesk()).await.unwrap_err();
    assert!(matches!(unknown, LifecycleError::Validation(ValidationError::UnknownCompany(99))));

    let closed = h.engine.create(creation("jdoe", inactive.id), &helpdesk()).await.unwrap_err();
    assert!(matches!(closed, LifecycleError::Validation(ValidationError::UnknownCompany(_))));

    let builtin = h
        .engine
        .create(group("jdoe", "Domain Admins", GroupAction::Add), &helpdesk())
        .await
        .unwrap_err();
    assert!(matches!(builtin, LifecycleError::Validation(ValidationError::BuiltInGroup(_))));

    let anonymous = h.engine.create(deletion("jdoe"), &ActorContext::new("  ")).await.unwrap_err();
    assert!(matches!(anonymous, LifecycleError::Validation(ValidationError::Missing { .. })));

    assert!(h.store.activity().await.is_empty());
    assert!(h.store.users().await.is_empty());
}

#[tokio::test]
async fn rejection_needs_a_reason() {
    let h = Harness::new();
    let created = h.engine.create(deletion("jdoe"), &helpdesk()).await.unwrap();

    let err = h.engine.reject(RequestKind::Deletion, created.id, "   ", &approver()).await.unwrap_err();

    assert!(matches!(err, LifecycleError::Validation(ValidationError::Missing { field: "reason" })));
    assert_eq!(
        h.store.request(RequestKind::Deletion, created.id).await.unwrap().status,
        RequestStatus::Pending
    );
}

#[tokio::test]
async fn acting_on_a_missing_request_is_not_actionable() {
    let h = Harness::new();

    let approve = h.engine.approve(RequestKind::Group, 404, &approver()).await.unwrap();
    let reject = h.engine.reject(RequestKind::Group, 404, "nope", &approver()).await.unwrap();

    assert_eq!(approve, Transition::NotActionable(NotActionable::NotFound));
    assert_eq!(reject, Transition::NotActionable(NotActionable::NotFound));
}
