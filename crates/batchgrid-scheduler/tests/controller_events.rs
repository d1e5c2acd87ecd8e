//! Integration tests for scheduler callback handling.
//!
//! These drive `SchedulerEventController` through cluster-manager events
//! with recording collaborators and check what reaches the resource
//! ledgers, the execution registry, the reconciliation set, cleanup and
//! the durable outcome recorders.

mod common;

use std::sync::Arc;

use batchgrid_execution::RunningJobExecution;
use batchgrid_resources::NodeResources;
use batchgrid_scheduler::{ControllerState, MasterInfo, SchedulerEvent, TaskStatus};
use batchgrid_state::{
    ExecutionStatus, JobExecutionRecord, NODE_LOST, SCHEDULER_LOST, TASK_FAILED, TASK_LOST,
    TaskKind, TaskState,
};

use common::{MockDriver, MockOutcomes, mock_controller, offer, running_execution};

fn master() -> MasterInfo {
    MasterInfo {
        hostname: "master-1".to_string(),
        port: 5050,
    }
}

fn running_record(id: u64, agent_id: &str) -> JobExecutionRecord {
    JobExecutionRecord {
        id,
        job_type: "convert".to_string(),
        status: ExecutionStatus::Running,
        agent_id: Some(agent_id.to_string()),
        priority: 1,
        resources: NodeResources::from_scalars(1.0, 128.0, 0.0),
        tasks: vec![TaskKind::Main],
        queued_at: 10,
        started_at: Some(20),
        ended_at: None,
        error: None,
        task_results: Vec::new(),
    }
}

// ── Offers ──────────────────────────────────────────────────────────

#[test]
fn offer_is_visible_after_refresh() {
    let mock = Arc::new(MockOutcomes::default());
    let (controller, _) = mock_controller(&mock);

    controller.handle(SchedulerEvent::ResourceOffers(vec![offer(
        "o1", "a1", 4.0, 1024.0, 0.0,
    )]));
    controller.resources().refresh_agent_resources(&[]);

    let agent = controller.resources().agent("a1").unwrap();
    assert_eq!(agent.offered(), &NodeResources::from_scalars(4.0, 1024.0, 0.0));
    assert!(agent.running().is_zero());

    let node = controller.nodes().get_node("a1").unwrap();
    assert_eq!(node.hostname.as_deref(), Some("a1.cluster.local"));
}

#[test]
fn rescinded_offer_is_not_counted() {
    let mock = Arc::new(MockOutcomes::default());
    let (controller, _) = mock_controller(&mock);

    controller.resource_offers(vec![
        offer("o1", "a1", 4.0, 1024.0, 0.0),
        offer("o2", "a1", 1.0, 256.0, 0.0),
    ]);
    controller.resources().refresh_agent_resources(&[]);
    controller.handle(SchedulerEvent::OfferRescinded("o1".to_string()));

    let agent = controller.resources().agent("a1").unwrap();
    assert_eq!(agent.offered(), &NodeResources::from_scalars(1.0, 256.0, 0.0));
}

// ── Status updates ──────────────────────────────────────────────────

#[test]
fn lost_task_ends_execution_and_leaves_reconciliation() {
    let mock = Arc::new(MockOutcomes::default());
    let (controller, cleanup) = mock_controller(&mock);
    let task_id = running_execution(&controller, 1, "a1");
    controller.recon().add_task_ids([task_id.clone()]);

    controller.handle(SchedulerEvent::StatusUpdate(TaskStatus::new(
        &task_id,
        "a1",
        TaskState::Lost,
        200,
    )));

    assert!(controller.executions().get_execution(1).is_none());
    assert_eq!(cleanup.pending_for("a1"), vec![1]);
    assert!(!controller.recon().contains(&task_id));

    let failures = mock.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].error, TASK_LOST);
}

#[test]
fn unknown_task_fails_with_scheduler_lost_once() {
    let mock = Arc::new(MockOutcomes::default());
    let (controller, cleanup) = mock_controller(&mock);

    controller.status_update(TaskStatus::new("7_main", "a1", TaskState::Running, 300));

    let failures = mock.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].job_exe_id, 7);
    assert_eq!(failures[0].error, SCHEDULER_LOST);
    assert!(failures[0].context.is_empty());
    assert_eq!(cleanup.pending_count(), 0);
    assert!(controller.recon().is_empty());
}

#[test]
fn finished_without_exit_code_reports_zero() {
    let mock = Arc::new(MockOutcomes::default());
    let (controller, _) = mock_controller(&mock);
    let task_id = running_execution(&controller, 1, "a1");

    controller.status_update(TaskStatus::new(&task_id, "a1", TaskState::Finished, 400));

    let completions = mock.completions();
    assert_eq!(completions.len(), 1);
    assert_eq!(completions[0].0, 1);
    assert_eq!(completions[0].1[0].exit_code, Some(0));
    assert!(controller.executions().is_empty());
}

#[test]
fn failed_task_keeps_reported_exit_code() {
    let mock = Arc::new(MockOutcomes::default());
    let (controller, _) = mock_controller(&mock);
    let task_id = running_execution(&controller, 1, "a1");

    controller.status_update(
        TaskStatus::new(&task_id, "a1", TaskState::Failed, 400).with_exit_code(137),
    );

    let failures = mock.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].error, TASK_FAILED);
    assert_eq!(failures[0].context[0].exit_code, Some(137));
}

#[test]
fn storage_error_during_update_requeues_task() {
    let mock = Arc::new(MockOutcomes::default());
    let (controller, cleanup) = mock_controller(&mock);
    let task_id = running_execution(&controller, 1, "a1");
    mock.fail_writes_for(1);

    controller.status_update(TaskStatus::new(&task_id, "a1", TaskState::Killed, 500));

    assert!(controller.recon().contains(&task_id));
    // Terminal in memory, so it still leaves the registry.
    assert!(controller.executions().is_empty());
    assert_eq!(cleanup.pending_for("a1"), vec![1]);
}

#[test]
fn update_for_non_current_task_is_ignored() {
    let mock = Arc::new(MockOutcomes::default());
    let (controller, _) = mock_controller(&mock);
    let shared = controller.executions().add(RunningJobExecution::new(
        3,
        "convert",
        "a1",
        NodeResources::from_scalars(1.0, 64.0, 0.0),
        &[TaskKind::Main, TaskKind::Post],
    ));
    shared.lock().unwrap().task_launched("3_main", 10).unwrap();

    controller.status_update(TaskStatus::new("3_post", "a1", TaskState::Failed, 20));

    assert!(mock.failures().is_empty());
    assert!(controller.recon().is_empty());
    assert!(controller.executions().get_execution(3).is_some());
}

#[test]
fn cleanup_updates_bypass_the_registry() {
    let mock = Arc::new(MockOutcomes::default());
    let (controller, cleanup) = mock_controller(&mock);
    let task_id = running_execution(&controller, 1, "a1");
    controller.status_update(TaskStatus::new(&task_id, "a1", TaskState::Finished, 50));
    assert_eq!(cleanup.pending_for("a1"), vec![1]);
    let logged = controller.updates().len();

    controller.recon().add_task_ids(["cleanup_a1_1"]);
    controller.status_update(TaskStatus::new("cleanup_a1_1", "a1", TaskState::Finished, 60));

    assert!(cleanup.pending_for("a1").is_empty());
    assert!(!controller.recon().contains("cleanup_a1_1"));
    assert!(mock.failures().is_empty());
    assert_eq!(controller.updates().len(), logged);
}

#[test]
fn unparseable_task_id_is_dropped() {
    let mock = Arc::new(MockOutcomes::default());
    let (controller, _) = mock_controller(&mock);
    controller.recon().add_task_ids(["garbage"]);

    controller.status_update(TaskStatus::new("garbage", "a1", TaskState::Lost, 10));

    assert!(mock.failures().is_empty());
    assert!(!controller.recon().contains("garbage"));
}

// ── Agent loss ──────────────────────────────────────────────────────

#[test]
fn agent_loss_requeues_only_failed_writes() {
    let mock = Arc::new(MockOutcomes::default());
    let (controller, cleanup) = mock_controller(&mock);
    controller.resource_offers(vec![offer("o1", "a1", 4.0, 1024.0, 0.0)]);
    controller.resources().refresh_agent_resources(&[]);

    let failing_task = running_execution(&controller, 1, "a1");
    let healthy_task = running_execution(&controller, 2, "a1");
    let other_agent_task = running_execution(&controller, 3, "a2");
    mock.fail_writes_for(1);

    controller.handle(SchedulerEvent::AgentLost("a1".to_string()));

    assert!(controller.recon().contains(&failing_task));
    assert!(!controller.recon().contains(&healthy_task));
    assert!(!controller.recon().contains(&other_agent_task));

    // Both executions on a1 are finished and handed to cleanup.
    assert!(controller.executions().get_execution(1).is_none());
    assert!(controller.executions().get_execution(2).is_none());
    assert!(controller.executions().get_execution(3).is_some());
    assert_eq!(cleanup.pending_for("a1"), vec![1, 2]);

    let failures = mock.failures();
    assert_eq!(failures.len(), 2);
    assert!(failures.iter().all(|f| f.error == NODE_LOST));

    assert!(controller.nodes().get_node("a1").is_none());
    assert!(controller.resources().agent("a1").is_none());
}

#[test]
fn lost_agent_contributes_nothing_to_status() {
    let mock = Arc::new(MockOutcomes::default());
    let (controller, _) = mock_controller(&mock);
    controller.resource_offers(vec![
        offer("o1", "a1", 4.0, 1024.0, 0.0),
        offer("o2", "a2", 2.0, 512.0, 0.0),
    ]);
    controller.resources().refresh_agent_resources(&[]);

    controller.agent_lost("a1");

    let status = controller.generate_status();
    assert_eq!(
        status.resources.offered,
        NodeResources::from_scalars(2.0, 512.0, 0.0)
    );
    assert_eq!(status.nodes.len(), 1);
    assert_eq!(status.nodes[0].agent_id, "a2");
}

#[test]
fn agent_loss_reclaims_recon_entry_on_success() {
    let mock = Arc::new(MockOutcomes::default());
    let (controller, _) = mock_controller(&mock);
    let task_id = running_execution(&controller, 1, "a1");
    controller.recon().add_task_ids([task_id.clone()]);

    controller.agent_lost("a1");

    assert!(!controller.recon().contains(&task_id));
}

#[test]
fn informational_callbacks_do_not_mutate_state() {
    let mock = Arc::new(MockOutcomes::default());
    let (controller, _) = mock_controller(&mock);
    running_execution(&controller, 1, "a1");

    controller.handle(SchedulerEvent::FrameworkMessage {
        executor_id: "exec-1".to_string(),
        agent_id: "a1".to_string(),
        data: b"hello".to_vec(),
    });
    controller.handle(SchedulerEvent::ExecutorLost {
        executor_id: "exec-1".to_string(),
        agent_id: "a1".to_string(),
        status: 1,
    });
    controller.handle(SchedulerEvent::Error("framework removed".to_string()));

    assert!(controller.executions().get_execution(1).is_some());
    assert!(mock.failures().is_empty());
    assert_eq!(controller.state(), ControllerState::Unregistered);
}

// ── Registration ────────────────────────────────────────────────────

#[tokio::test]
async fn registration_fails_orphans_and_reconciles_known() {
    let mock = Arc::new(MockOutcomes::default());
    let (controller, _) = mock_controller(&mock);
    let known_task = running_execution(&controller, 1, "a1");
    mock.running
        .lock()
        .unwrap()
        .extend([running_record(1, "a1"), running_record(5, "a2")]);

    controller.handle(SchedulerEvent::Registered {
        driver: Arc::new(MockDriver::default()),
        framework_id: "fw-1".to_string(),
        master: master(),
    });

    assert_eq!(controller.state(), ControllerState::Registered);
    let failures = mock.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].job_exe_id, 5);
    assert_eq!(failures[0].error, SCHEDULER_LOST);
    assert!(controller.recon().contains(&known_task));

    controller.shutdown();
    controller.join_workers().await;
    assert_eq!(controller.state(), ControllerState::Shutdown);
}

#[tokio::test]
async fn reregistration_swaps_driver_and_reconciles_again() {
    let mock = Arc::new(MockOutcomes::default());
    let (controller, _) = mock_controller(&mock);
    controller.registered(Arc::new(MockDriver::default()), "fw-1", master());

    controller.disconnected();
    assert_eq!(controller.state(), ControllerState::Disconnected);

    mock.running.lock().unwrap().push(running_record(9, "a3"));
    let second = Arc::new(MockDriver::default());
    controller.handle(SchedulerEvent::Reregistered {
        driver: second.clone(),
        master: MasterInfo {
            hostname: "master-2".to_string(),
            port: 5050,
        },
    });

    assert_eq!(controller.state(), ControllerState::Registered);
    assert_eq!(mock.failures().len(), 1);

    controller.recon().add_task_ids(["9_main"]);
    controller.reconciliation_worker().reconcile();
    assert_eq!(second.reconciles.lock().unwrap().len(), 1);

    let status = controller.generate_status();
    assert_eq!(status.framework_id.as_deref(), Some("fw-1"));
    assert_eq!(status.master.unwrap().hostname, "master-2");

    controller.shutdown();
    controller.join_workers().await;
}

// ── Status report ───────────────────────────────────────────────────

#[test]
fn status_report_serializes_cluster_totals() {
    let mock = Arc::new(MockOutcomes::default());
    let (controller, _) = mock_controller(&mock);
    controller.resource_offers(vec![offer("o1", "a1", 4.0, 1024.0, 0.0)]);
    let task_id = running_execution(&controller, 1, "a1");
    controller.recon().add_task_ids([task_id]);
    controller
        .resources()
        .refresh_agent_resources(&controller.executions().task_resources());

    let status = controller.generate_status();
    assert_eq!(status.executions.running, 1);
    assert_eq!(status.executions.reconciling, 1);

    let json = serde_json::to_value(&status).unwrap();
    assert_eq!(json["resources"]["offered"]["cpus"], 4.0);
    assert_eq!(json["resources"]["running"]["mem"], 512.0);
    assert_eq!(json["resources"]["watermark"]["cpus"], 6.0);
    assert_eq!(json["nodes"][0]["hostname"], "a1.cluster.local");
    assert_eq!(json["state"], "unregistered");
}
