//! Integration tests for events

#[cfg(test)]
mod tests {
    use stackbuild_errors::BuildError;
    use stackbuild_events::*;

    #[tokio::test]
    async fn test_event_sender_emit_helpers() {
        let (tx, mut rx) = channel();

        tx.emit_error("test error");
        tx.emit_debug("test debug");

        let event1 = rx.recv().await.unwrap();
        assert!(matches!(event1, AppEvent::General(GeneralEvent::Error { .. })));

        let event2 = rx.recv().await.unwrap();
        assert!(matches!(
            event2,
            AppEvent::General(GeneralEvent::DebugLog { .. })
        ));
    }

    #[tokio::test]
    async fn test_dropped_receiver() {
        let (tx, rx) = channel();
        drop(rx);

        // Should not panic when receiver is dropped
        tx.emit_warning("ignored");
    }

    #[test]
    fn test_absent_sender_is_silent() {
        let none: Option<EventSender> = None;
        none.emit_warning("nobody listens");
        assert!(none.event_sender().is_none());
    }

    #[test]
    fn test_failure_log_levels() {
        let err = BuildError::CommandFailed {
            stage: "curl".into(),
            command: "make".into(),
            exit_code: Some(2),
            log_path: None,
        };
        let event = AppEvent::Stage(StageEvent::Failed {
            stage: "curl".into(),
            failure: FailureContext::from_error(&err),
        });
        assert_eq!(event.log_level(), tracing::Level::ERROR);
        assert_eq!(event.log_target(), "stackbuild::events::stage");

        let warning = AppEvent::General(GeneralEvent::warning("vendor mismatch"));
        assert_eq!(warning.log_level(), tracing::Level::WARN);
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = AppEvent::Stage(StageEvent::Skipped {
            stage: "zlib".into(),
            reason: SkipReason::InstallMarker {
                path: "/opt/deps/lib/libz.a".into(),
            },
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["domain"], "stage");
        assert_eq!(json["event"]["type"], "Skipped");
    }
}
