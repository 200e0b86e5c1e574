use revir::prelude::*;
use revir::runtime::{ErrorEvent, ReadyEvent, StateType};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const PAYROLL: &str = r#"{
    "states": {
        "start": "EmployeeList",
        "EmployeeList": {
            "transitions": {
                "Add employee": "AddEmployee",
                "Edit employee": "EditEmployee",
                "Run payroll": "RunPayroll",
                "View tax center": "TaxCenter",
                "Enter run payroll": "EnterRunPayroll"
            }
        },
        "AddEmployee": {
            "transitions": {
                "Edit W-4": "W4",
                "View employee list": "EmployeeList"
            }
        },
        "EditEmployee": { "transitions": "AddEmployee" },
        "W4": {},
        "TaxCenter": {
            "transitions": {
                "Enter run payroll": "EnterRunPayroll",
                "View employee list": "EmployeeList"
            }
        },
        "EnterRunPayroll": {
            "resolver": "payroll-ready",
            "transitions": { "No employees": "AddEmployee", "Ready": "RunPayroll" }
        },
        "EnterPayTaxes": {
            "resolver": "payroll-ready",
            "transitions": { "No taxes": "EmployeeList", "Ready": "TaxCenter" }
        },
        "RunPayroll": { "props": { "layout": "trowser" } }
    }
}"#;

fn registry() -> ResolverRegistry {
    ResolverRegistry::new().register(
        "payroll-ready",
        resolver_fn(|_| async {
            tokio::time::sleep(Duration::from_millis(2)).await;
            Ok::<_, ResolverError>("Ready".to_string())
        }),
    )
}

fn payroll() -> Revir {
    Revir::from_json(PAYROLL, &registry()).unwrap()
}

#[derive(Clone, Default)]
struct Recorder {
    ready: Arc<Mutex<Vec<ReadyEvent>>>,
    errors: Arc<Mutex<Vec<ErrorEvent>>>,
}

impl Recorder {
    fn attach(flow: &Revir) -> Self {
        let recorder = Self::default();
        let ready = recorder.ready.clone();
        flow.on_ready(move |e| ready.lock().unwrap().push(e.clone()))
            .unwrap();
        let errors = recorder.errors.clone();
        flow.on_error(move |e| errors.lock().unwrap().push(e.clone()))
            .unwrap();
        recorder
    }

    fn visited(&self) -> Vec<String> {
        self.ready
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.current.clone())
            .collect()
    }
}

#[tokio::test]
async fn starts_at_employee_list() {
    let flow = payroll();
    assert_eq!(flow.current().as_deref(), Some("EmployeeList"));
    assert_eq!(flow.phase(), Phase::Ready);
}

#[tokio::test]
async fn add_employee_and_back() {
    let flow = payroll();
    let recorder = Recorder::attach(&flow);

    flow.transition("Add employee");
    flow.settled().await;
    assert_eq!(flow.current().as_deref(), Some("AddEmployee"));
    assert_eq!(flow.history(), vec!["EmployeeList"]);

    flow.previous();
    flow.settled().await;
    assert_eq!(flow.current().as_deref(), Some("EmployeeList"));
    assert_eq!(recorder.visited(), vec!["AddEmployee", "EmployeeList"]);
}

#[tokio::test]
async fn edit_employee_borrows_add_employee_transitions() {
    let flow = payroll();
    flow.transition("Edit employee");
    flow.transition("Edit W-4");
    flow.settled().await;

    assert_eq!(flow.current().as_deref(), Some("W4"));
    assert_eq!(flow.history(), vec!["EmployeeList", "EditEmployee"]);

    // W4 is an end node: an empty transition goes back.
    flow.transition("");
    flow.settled().await;
    assert_eq!(flow.current().as_deref(), Some("EditEmployee"));
}

#[tokio::test]
async fn bogus_transition_reports_error() {
    let flow = payroll();
    let recorder = Recorder::attach(&flow);

    flow.transition("Fire everyone");
    flow.settled().await;

    assert_eq!(flow.current().as_deref(), Some("EmployeeList"));
    let errors = recorder.errors.lock().unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(
        errors[0].error,
        FlowError::UnknownTransition {
            node: "EmployeeList".into(),
            transition: "Fire everyone".into(),
        }
    );
}

#[tokio::test]
async fn run_payroll_branch_settles_once() {
    let flow = payroll();
    let recorder = Recorder::attach(&flow);

    flow.transition("Enter run payroll");
    flow.settled().await;

    let ready = recorder.ready.lock().unwrap();
    assert_eq!(ready.len(), 1);
    assert_eq!(ready[0].current, "RunPayroll");
    assert_eq!(ready[0].props, serde_json::json!({"layout": "trowser"}));
    assert_eq!(ready[0].state_type, StateType::State);
    assert_eq!(flow.history(), vec!["EmployeeList"]);
}

#[tokio::test]
async fn going_back_skips_the_branch() {
    let flow = payroll();
    flow.transition("View tax center");
    flow.transition("Enter run payroll");
    flow.settled().await;
    assert_eq!(flow.current().as_deref(), Some("RunPayroll"));
    assert_eq!(flow.history(), vec!["EmployeeList", "TaxCenter"]);

    flow.previous();
    flow.settled().await;
    assert_eq!(flow.current().as_deref(), Some("TaxCenter"));
}

#[tokio::test]
async fn driver_reads_combined_snapshot() {
    let flow = payroll();
    flow.transition("Add employee");
    flow.settled().await;

    let snapshot = flow.driver().current("current history").unwrap();
    assert_eq!(
        snapshot,
        serde_json::json!({"current": "AddEmployee", "history": ["EmployeeList"]})
    );
    assert_eq!(
        flow.driver().current("current").unwrap(),
        serde_json::json!("AddEmployee")
    );
}
