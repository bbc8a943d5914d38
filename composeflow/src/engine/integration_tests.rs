//! End-to-end run tests against the scripted runner and memory transport.

#[cfg(test)]
mod tests {
    use crate::compose::MountDescriptor;
    use crate::contexts::{Context, ContextRegistry};
    use crate::engine::{Orchestrator, RunRequest};
    use crate::errors::{ErrorKind, OrchestrationError, TransferError};
    use crate::events::{COMPLETED_EVENT, FAILED_EVENT, PHASE_EVENT};
    use crate::exec::{CommandOutput, DockerCli};
    use crate::testing::{
        ps_output, TestHarness, LOCAL_CONTEXT, LOCAL_ENDPOINT, MOUNTED_SPEC, NGINX_TOKEN,
        REMOTE_CONTEXT, REMOTE_ENDPOINT, TWO_SERVICE_SPEC,
    };
    use crate::transfer::TransferClient;
    use std::sync::Arc;
    use std::time::Duration;

    const PS: &str = "ps --services";
    const UP: &str = "up --detach";

    fn orchestrator(harness: &TestHarness) -> Orchestrator {
        let docker = DockerCli::new(harness.runner.clone(), "docker");
        let registry = Arc::new(ContextRegistry::from_contexts([
            Context::new(REMOTE_CONTEXT, REMOTE_ENDPOINT),
            Context::new(LOCAL_CONTEXT, LOCAL_ENDPOINT),
        ]));
        let transfer = TransferClient::new(
            harness.transport.clone(),
            harness.config.transfer.retry.clone(),
            harness.config.transfer.default_port,
        );
        Orchestrator::new(registry, docker, transfer, &harness.config)
            .with_event_sink(harness.events.clone())
    }

    fn converging_harness() -> TestHarness {
        let harness = TestHarness::new().unwrap();
        harness.runner.on(PS, ps_output(&["web", "worker"]));
        harness
    }

    fn nginx_mount() -> MountDescriptor {
        MountDescriptor::new(NGINX_TOKEN, "/srv/edge/nginx.conf", "worker_processes 4;\n")
    }

    #[tokio::test]
    async fn test_unknown_context_has_no_side_effects() {
        let harness = converging_harness();
        let engine = orchestrator(&harness);

        let err = engine
            .run(RunRequest::new("nowhere", TWO_SERVICE_SPEC).with_mount(nginx_mount()))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::NotFoundError);
        assert_eq!(err.status_code(), 400);
        assert_eq!(harness.runner.call_count(), 0);
        assert_eq!(harness.transport.sessions_opened(), 0);
        assert!(!engine.staging().spec_path("nowhere").exists());
        assert_eq!(engine.locks().held_count(), 0);
        assert!(harness.events.events_of_type(PHASE_EVENT).is_empty());
        assert_eq!(harness.events.events_of_type(FAILED_EVENT).len(), 1);
    }

    #[tokio::test]
    async fn test_successful_run_targets_context_explicitly() {
        let harness = converging_harness();
        harness
            .runner
            .on(UP, CommandOutput::ok("Container proj-web-1  Started\n"));
        let engine = orchestrator(&harness);

        let result = engine
            .run(RunRequest::new(REMOTE_CONTEXT, TWO_SERVICE_SPEC))
            .await
            .unwrap();

        assert_eq!(result.exit_code, Some(0));
        assert!(result.stdout.contains("Started"));

        let staged = engine.staging().spec_path(REMOTE_CONTEXT);
        let lines: Vec<String> = harness.runner.calls().iter().map(|c| c.line()).collect();
        assert_eq!(
            lines,
            vec![
                "--context edge-1 network prune --force".to_string(),
                format!(
                    "--context edge-1 compose --file {} up --detach --remove-orphans --force-recreate --pull always --quiet-pull",
                    staged.display()
                ),
                format!(
                    "--context edge-1 compose --file {} ps --services --status running",
                    staged.display()
                ),
            ]
        );
        assert_eq!(std::fs::read_to_string(&staged).unwrap(), TWO_SERVICE_SPEC);
        assert_eq!(engine.locks().held_count(), 0);
    }

    #[tokio::test]
    async fn test_successful_run_walks_every_phase() {
        let harness = converging_harness();
        let engine = orchestrator(&harness);

        engine
            .run(RunRequest::new(REMOTE_CONTEXT, TWO_SERVICE_SPEC))
            .await
            .unwrap();

        let phases: Vec<String> = harness
            .events
            .events_of_type(PHASE_EVENT)
            .into_iter()
            .filter_map(|d| d.and_then(|d| d["to"].as_str().map(String::from)))
            .collect();
        assert_eq!(
            phases,
            vec!["locked", "validating", "staging", "running_lifecycle", "converging", "idle"]
        );
        assert_eq!(harness.events.events_of_type(COMPLETED_EVENT).len(), 1);
        assert!(harness.events.events_of_type(FAILED_EVENT).is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_runs_on_one_context_conflict() {
        let harness = converging_harness();
        harness
            .runner
            .on_delayed(UP, CommandOutput::ok(""), Duration::from_millis(50));
        let engine = orchestrator(&harness);

        let (first, second) = tokio::join!(
            engine.run(RunRequest::new(REMOTE_CONTEXT, TWO_SERVICE_SPEC)),
            engine.run(RunRequest::new(REMOTE_CONTEXT, TWO_SERVICE_SPEC)),
        );

        let outcomes = [first, second];
        let conflicts = outcomes
            .iter()
            .filter(|r| matches!(r, Err(OrchestrationError::Conflict { .. })))
            .count();
        assert_eq!(conflicts, 1);
        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(harness.runner.count_matching(UP), 1);
        assert_eq!(engine.locks().held_count(), 0);
    }

    #[tokio::test]
    async fn test_runs_on_different_contexts_proceed_together() {
        let harness = converging_harness();
        harness
            .runner
            .on_delayed(UP, CommandOutput::ok(""), Duration::from_millis(20));
        let engine = orchestrator(&harness);

        let (a, b) = tokio::join!(
            engine.run(RunRequest::new(REMOTE_CONTEXT, TWO_SERVICE_SPEC)),
            engine.run(RunRequest::new(LOCAL_CONTEXT, TWO_SERVICE_SPEC)),
        );

        assert!(a.is_ok());
        assert!(b.is_ok());
        assert!(engine.staging().spec_path(REMOTE_CONTEXT).exists());
        assert!(engine.staging().spec_path(LOCAL_CONTEXT).exists());
    }

    #[tokio::test]
    async fn test_lock_is_free_after_every_failure() {
        let harness = converging_harness();
        let engine = orchestrator(&harness);

        let invalid = engine
            .run(RunRequest::new(REMOTE_CONTEXT, "services: [web, worker]"))
            .await
            .unwrap_err();
        assert!(matches!(invalid, OrchestrationError::Validation(_)));
        assert!(!engine.locks().is_held(REMOTE_CONTEXT));

        harness
            .runner
            .on("network prune", CommandOutput::failed(1, "cannot connect to daemon\n"));
        let exec = engine
            .run(RunRequest::new(REMOTE_CONTEXT, TWO_SERVICE_SPEC))
            .await
            .unwrap_err();
        match exec {
            OrchestrationError::Execution { stderr, exit_code, .. } => {
                assert_eq!(stderr, "cannot connect to daemon");
                assert_eq!(exit_code, Some(1));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!engine.locks().is_held(REMOTE_CONTEXT));

        harness.runner.on("network prune", CommandOutput::ok(""));
        assert!(engine
            .run(RunRequest::new(REMOTE_CONTEXT, TWO_SERVICE_SPEC))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_failed_bring_up_is_an_execution_error() {
        let harness = converging_harness();
        harness
            .runner
            .on(UP, CommandOutput::failed(18, "pull access denied\n"));
        let engine = orchestrator(&harness);

        let err = engine
            .run(RunRequest::new(REMOTE_CONTEXT, TWO_SERVICE_SPEC))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ExecutionError);
        assert_eq!(err.status_code(), 500);
        assert!(err.to_string().contains("pull access denied"));
        assert_eq!(harness.runner.count_matching(PS), 0);

        let failed = harness.events.events_of_type(FAILED_EVENT);
        assert_eq!(failed[0].as_ref().unwrap()["phase"], "running_lifecycle");
    }

    #[tokio::test]
    async fn test_service_count_mismatch_is_a_convergence_error() {
        let harness = TestHarness::new().unwrap();
        harness.runner.on(PS, ps_output(&["web"]));
        let engine = orchestrator(&harness);

        let err = engine
            .run(RunRequest::new(REMOTE_CONTEXT, TWO_SERVICE_SPEC))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            OrchestrationError::Convergence {
                expected: 2,
                observed: 1,
                ..
            }
        ));
        assert_eq!(err.status_code(), 500);
        assert!(!engine.locks().is_held(REMOTE_CONTEXT));
    }

    #[tokio::test]
    async fn test_scaled_service_counts_once() {
        let harness = TestHarness::new().unwrap();
        harness.runner.on(PS, ps_output(&["web", "web"]));
        let engine = orchestrator(&harness);

        let result = engine
            .run(RunRequest::new(
                REMOTE_CONTEXT,
                "services:\n  web:\n    image: nginx\n    scale: 2\n",
            ))
            .await;

        tokio_test::assert_ok!(result);
        assert!(!engine.locks().is_held(REMOTE_CONTEXT));
    }

    #[tokio::test]
    async fn test_blank_ps_lines_do_not_count_as_services() {
        let harness = TestHarness::new().unwrap();
        harness.runner.on(PS, CommandOutput::ok("\n"));
        let engine = orchestrator(&harness);

        let err = engine
            .run(RunRequest::new(REMOTE_CONTEXT, "services:\n  web:\n    image: nginx\n"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            OrchestrationError::Convergence {
                expected: 1,
                observed: 0,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_mount_tokens_are_substituted_and_uploaded() {
        let harness = TestHarness::new().unwrap();
        harness.runner.on(PS, ps_output(&["web"]));
        let engine = orchestrator(&harness);

        engine
            .run(RunRequest::new(REMOTE_CONTEXT, MOUNTED_SPEC).with_mount(nginx_mount()))
            .await
            .unwrap();

        let staged = std::fs::read_to_string(engine.staging().spec_path(REMOTE_CONTEXT)).unwrap();
        assert!(!staged.contains(NGINX_TOKEN));
        assert_eq!(staged.matches("/srv/edge/nginx.conf").count(), 2);

        assert_eq!(
            harness.transport.uploaded("/srv/edge/nginx.conf").as_deref(),
            Some(&b"worker_processes 4;\n"[..])
        );
        let target = &harness.transport.targets()[0];
        assert_eq!(target.host, "edge-1");
        assert_eq!(target.user.as_deref(), Some("deploy"));
        assert_eq!(target.port, 2222);

        let up = harness
            .runner
            .calls()
            .into_iter()
            .find(|c| c.line().contains(UP))
            .unwrap();
        assert!(up.line().ends_with("--force-recreate --pull always"));
        assert_eq!(harness.scratch_entries(), 0);
    }

    #[tokio::test]
    async fn test_caller_args_replace_defaults() {
        let harness = converging_harness();
        let engine = orchestrator(&harness);

        engine
            .run(RunRequest::new(REMOTE_CONTEXT, TWO_SERVICE_SPEC).with_extra_args("--build --wait"))
            .await
            .unwrap();
        engine
            .run(RunRequest::new(REMOTE_CONTEXT, TWO_SERVICE_SPEC).with_extra_args("   "))
            .await
            .unwrap();

        let ups: Vec<String> = harness
            .runner
            .calls()
            .iter()
            .map(|c| c.line())
            .filter(|l| l.contains(UP))
            .collect();
        assert!(ups[0].ends_with("--remove-orphans --build --wait"));
        assert!(ups[1].ends_with("--quiet-pull"));
    }

    #[tokio::test]
    async fn test_transfer_retry_is_transparent() {
        let harness = TestHarness::new().unwrap();
        harness.runner.on(PS, ps_output(&["web"]));
        harness.transport.fail_times("/srv/edge/nginx.conf", 2);
        let engine = orchestrator(&harness);

        let result = engine
            .run(RunRequest::new(REMOTE_CONTEXT, MOUNTED_SPEC).with_mount(nginx_mount()))
            .await;

        tokio_test::assert_ok!(result);
        assert_eq!(harness.transport.attempts("/srv/edge/nginx.conf"), 3);
    }

    #[tokio::test]
    async fn test_exhausted_transfer_stops_before_lifecycle() {
        let harness = TestHarness::new().unwrap();
        harness.transport.fail_times("/srv/edge/nginx.conf", 3);
        let engine = orchestrator(&harness);

        let err = engine
            .run(RunRequest::new(REMOTE_CONTEXT, MOUNTED_SPEC).with_mount(nginx_mount()))
            .await
            .unwrap_err();

        assert_eq!(err.status_code(), 504);
        match &err {
            OrchestrationError::Transfer(t) => {
                assert_eq!(t.remote_path(), Some("/srv/edge/nginx.conf"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(harness.runner.call_count(), 0);
        assert!(!engine.locks().is_held(REMOTE_CONTEXT));
        assert_eq!(harness.scratch_entries(), 0);
    }

    #[tokio::test]
    async fn test_mounts_need_an_ssh_endpoint() {
        let harness = converging_harness();
        let engine = orchestrator(&harness);

        let err = engine
            .run(RunRequest::new(LOCAL_CONTEXT, MOUNTED_SPEC).with_mount(nginx_mount()))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            OrchestrationError::Transfer(TransferError::InvalidEndpoint { .. })
        ));
        assert_eq!(harness.transport.upload_count(), 0);
    }
}
