use sigconfirm_core::fee::SendFeeStatus;
use sigconfirm_core::state_machine::{
    fee_transition, session_transition, FeeAction, SessionAction, SessionStatus,
};

#[test]
fn session_happy_path_transitions() {
    let (next, t1) =
        session_transition(SessionStatus::Open, SessionAction::Submit).expect("submit");
    assert_eq!(next, SessionStatus::Submitting);
    assert_eq!(t1.reason, "submit");

    let (next, _) =
        session_transition(next, SessionAction::SubmitSucceeded).expect("succeeded");
    assert_eq!(next, SessionStatus::Confirmed);

    let (next, _) = session_transition(next, SessionAction::Close).expect("close");
    assert_eq!(next, SessionStatus::Closed);
}

#[test]
fn failed_submit_returns_to_open() {
    let (next, _) =
        session_transition(SessionStatus::Submitting, SessionAction::SubmitFailed)
            .expect("failed");
    assert_eq!(next, SessionStatus::Open);
}

#[test]
fn dismiss_while_submitting_is_rejected() {
    let result = session_transition(SessionStatus::Submitting, SessionAction::Dismiss);
    assert!(result.is_err());
}

#[test]
fn closed_session_is_terminal() {
    for action in [
        SessionAction::Submit,
        SessionAction::SubmitFailed,
        SessionAction::SubmitSucceeded,
        SessionAction::Dismiss,
        SessionAction::Close,
    ] {
        assert!(session_transition(SessionStatus::Closed, action).is_err());
    }
}

#[test]
fn fee_status_cycle() {
    let status = fee_transition(&SendFeeStatus::Idle, FeeAction::Estimate).expect("estimate");
    assert_eq!(status, SendFeeStatus::Estimating);
    let status =
        fee_transition(&status, FeeAction::Failed("rpc down".into())).expect("failed");
    assert_eq!(status, SendFeeStatus::Error("rpc down".into()));
    let status = fee_transition(&status, FeeAction::Estimate).expect("retry");
    let status = fee_transition(&status, FeeAction::Succeeded).expect("ready");
    assert_eq!(status, SendFeeStatus::Ready);
    assert!(fee_transition(&status, FeeAction::Succeeded).is_err());
}
