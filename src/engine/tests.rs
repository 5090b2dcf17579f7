use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde_json::{Value, json};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpListener,
};

use crate::{
    ChatMessage, ChatflowError, Config, Engine, EngineBuilder, EngineSettings, FixedClock, HaltKind, ResumeBinding, Result, Sender, SessionStatus,
    TurnOutcome, common::Vars, runtime::Transport,
};

#[derive(Default)]
struct Recorder {
    calls: Mutex<Vec<String>>,
}

impl Recorder {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn push(
        &self,
        call: String,
    ) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl Transport for Recorder {
    async fn append_message(
        &self,
        _: &str,
        message: &ChatMessage,
    ) -> Result<()> {
        self.push(format!("message:{}", message.text));
        Ok(())
    }

    async fn persist_variables(
        &self,
        _: &str,
        delta: &Vars,
    ) -> Result<()> {
        let mut keys = delta.keys().cloned().collect::<Vec<_>>();
        keys.sort();
        self.push(format!("vars:{}", keys.join(",")));
        Ok(())
    }

    async fn transfer_to_queue(
        &self,
        _: &str,
        queue: &str,
        reason: Option<&str>,
    ) -> Result<()> {
        self.push(format!("queue:{}:{}", queue, reason.unwrap_or_default()));
        Ok(())
    }

    async fn close_session(
        &self,
        _: &str,
    ) -> Result<()> {
        self.push("close".to_string());
        Ok(())
    }
}

fn engine_with(config: Config) -> (Arc<Engine>, Arc<Recorder>) {
    let recorder = Arc::new(Recorder::default());
    let engine = EngineBuilder::new()
        .config(config)
        .transport(recorder.clone())
        .clock(Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2024, 3, 4, 10, 0, 0).unwrap())))
        .build()
        .unwrap();
    engine.launch();
    (Arc::new(engine), recorder)
}

fn engine() -> (Arc<Engine>, Arc<Recorder>) {
    engine_with(Config::default())
}

fn publish(
    engine: &Engine,
    graph: Value,
) -> String {
    let flow = engine.create_flow("atendimento").unwrap();
    republish(engine, &flow.id, graph);
    flow.id
}

fn republish(
    engine: &Engine,
    flow_id: &str,
    graph: Value,
) {
    engine.save_draft(flow_id, serde_json::from_value(graph).unwrap()).unwrap();
    engine.publish(flow_id).unwrap();
}

fn bot_texts(messages: &[ChatMessage]) -> Vec<String> {
    messages.iter().filter(|m| m.sender == Sender::Bot).map(|m| m.text.clone()).collect()
}

/// Answers `/ok*` with a json body, `/slow*` after five seconds, anything
/// else with a 500.
async fn http_stub() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = vec![0u8; 4096];
                let n = socket.read(&mut buf).await.unwrap_or(0);
                let request = String::from_utf8_lossy(&buf[..n]).to_string();
                let path = request.split_whitespace().nth(1).unwrap_or("/").to_string();
                let (status, body) = if path.starts_with("/ok") {
                    ("200 OK", r#"{"nome":"Ana","plano":{"tipo":"gold"}}"#)
                } else if path.starts_with("/slow") {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    ("200 OK", "{}")
                } else {
                    ("500 Internal Server Error", r#"{"erro":true}"#)
                };
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
            });
        }
    });
    format!("http://{}", addr)
}

#[tokio::test(flavor = "multi_thread")]
async fn test_collects_cpf_and_closes() {
    let (engine, recorder) = engine();
    let flow_id = publish(
        &engine,
        json!({
            "nodes": [
                {"id": "start", "type": "start"},
                {"id": "m", "type": "message", "data": {"text": "Oi"}},
                {"id": "i", "type": "input", "data": {"variableName": "cpf"}},
                {"id": "sv", "type": "setValue", "data": {"variableName": "status", "value": "ok"}},
                {"id": "f", "type": "final", "data": {"text": "Tchau"}}
            ],
            "edges": [
                {"id": "e1", "source": "start", "target": "m"},
                {"id": "e2", "source": "m", "target": "i"},
                {"id": "e3", "source": "i", "target": "sv"},
                {"id": "e4", "source": "sv", "target": "f"}
            ]
        }),
    );

    let report = engine.start_session(&flow_id).await.unwrap();
    assert_eq!(report.outcome, TurnOutcome::Paused);
    assert_eq!(report.session.current_node_id.as_deref(), Some("i"));
    assert_eq!(report.session.status, SessionStatus::Bot);
    assert_eq!(bot_texts(&report.session.messages), vec!["Oi"]);
    let sid = report.session.id.clone();

    let report = engine.submit_user_text(&sid, "12345678900").await.unwrap();
    assert_eq!(report.outcome, TurnOutcome::Closed);
    let session = engine.get_session(&sid).unwrap();
    assert_eq!(session.variables.get::<String>("cpf").as_deref(), Some("12345678900"));
    assert_eq!(session.variables.get::<String>("status").as_deref(), Some("ok"));
    assert_eq!(session.last_message().unwrap().text, "Tchau");
    assert_eq!(session.status, SessionStatus::Closed);
    assert_eq!(session.current_node_id, None);
    assert_eq!(session.pending_node_id, None);

    assert_eq!(
        recorder.calls(),
        vec!["message:Oi", "message:12345678900", "vars:cpf", "vars:status", "message:Tchau", "close"]
    );

    assert!(matches!(engine.submit_user_text(&sid, "oi?").await, Err(ChatflowError::Session(_))));

    let mut names = Vec::new();
    for _ in 0..50 {
        names = engine.session_events(&sid, 100).unwrap().into_iter().map(|e| e.name).collect::<Vec<_>>();
        if names.iter().any(|n| n == "SessionClosed") {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(names.contains(&"SessionStarted".to_string()));
    assert!(names.contains(&"SessionPaused".to_string()));
    assert!(names.contains(&"SessionClosed".to_string()));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_http_success_and_failure_routes() {
    let (engine, _) = engine();
    let base = http_stub().await;
    let graph = |path: &str| {
        json!({
            "nodes": [
                {"id": "start", "type": "start"},
                {"id": "h", "type": "httpRequest", "data": {
                    "url": format!("{}{}", base, path),
                    "mappings": [{"path": "$.nome", "variable": "nome"}, {"path": "$.plano.tipo", "variable": "plano"}],
                    "responseVariable": "resposta"
                }},
                {"id": "ok", "type": "message", "data": {"text": "Olá {nome}, plano {plano}"}},
                {"id": "fail", "type": "message", "data": {"text": "Serviço indisponível"}}
            ],
            "edges": [
                {"id": "e1", "source": "start", "target": "h"},
                {"id": "e2", "source": "h", "target": "ok", "sourceHandle": "success"},
                {"id": "e3", "source": "h", "target": "fail", "sourceHandle": "error"}
            ]
        })
    };

    let flow_id = publish(&engine, graph("/ok"));
    let report = engine.start_session(&flow_id).await.unwrap();
    assert_eq!(report.outcome, TurnOutcome::Ended);
    assert_eq!(bot_texts(&report.session.messages), vec!["Olá Ana, plano gold"]);
    assert_eq!(report.session.variables.get::<Value>("resposta").unwrap()["nome"], json!("Ana"));

    let flow_id = publish(&engine, graph("/fail"));
    let report = engine.start_session(&flow_id).await.unwrap();
    assert_eq!(report.outcome, TurnOutcome::Ended);
    assert_eq!(bot_texts(&report.session.messages), vec!["Serviço indisponível"]);
    assert!(report.session.halt.is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_http_timeout_routes_like_an_error() {
    let (engine, _) = engine();
    let base = http_stub().await;
    let graph = |with_error_edge: bool| {
        let mut edges = vec![json!({"id": "e1", "source": "start", "target": "h"})];
        if with_error_edge {
            edges.push(json!({"id": "e2", "source": "h", "target": "fail", "sourceHandle": "error"}));
        }
        json!({
            "nodes": [
                {"id": "start", "type": "start"},
                {"id": "h", "type": "httpRequest", "data": {"url": format!("{}/slow", base), "timeout": 200}},
                {"id": "fail", "type": "message", "data": {"text": "Tempo esgotado"}}
            ],
            "edges": edges
        })
    };

    let flow_id = publish(&engine, graph(true));
    let report = engine.start_session(&flow_id).await.unwrap();
    assert_eq!(bot_texts(&report.session.messages), vec!["Tempo esgotado"]);

    let flow_id = publish(&engine, graph(false));
    let report = engine.start_session(&flow_id).await.unwrap();
    assert_eq!(report.outcome, TurnOutcome::Halted);
    let halt = report.session.halt.clone().unwrap();
    assert_eq!(halt.kind, HaltKind::GraphIntegrity);
    assert_eq!(halt.node_id, "h");
    assert!(halt.retryable);
    assert!(report.session.last_message().unwrap().text.starts_with("[erro] external call:"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_queue_hands_off_until_an_agent_returns_it() {
    let (engine, recorder) = engine();
    let flow_id = publish(
        &engine,
        json!({
            "nodes": [
                {"id": "start", "type": "start"},
                {"id": "q", "type": "queue", "data": {"queueName": "suporte", "reason": "pedido"}},
                {"id": "m", "type": "message", "data": {"text": "nunca"}},
                {"id": "a", "type": "message", "data": {"text": "De volta ao bot"}}
            ],
            "edges": [
                {"id": "e1", "source": "start", "target": "q"},
                {"id": "e2", "source": "q", "target": "m"}
            ]
        }),
    );

    let report = engine.start_session(&flow_id).await.unwrap();
    assert_eq!(report.outcome, TurnOutcome::Handoff);
    assert_eq!(report.session.status, SessionStatus::Waiting);
    assert_eq!(report.session.queue.as_deref(), Some("suporte"));
    assert!(!bot_texts(&report.session.messages).contains(&"nunca".to_string()));
    assert!(recorder.calls().contains(&"queue:suporte:pedido".to_string()));
    let sid = report.session.id.clone();

    let report = engine.submit_user_text(&sid, "alô?").await.unwrap();
    assert_eq!(report.outcome, TurnOutcome::Relayed);
    assert_eq!(report.session.status, SessionStatus::Waiting);
    assert!(!bot_texts(&report.session.messages).contains(&"nunca".to_string()));

    let report = engine.assign_agent(&sid, "agente-7").await.unwrap();
    assert_eq!(report.outcome, TurnOutcome::Assigned);
    assert_eq!(report.session.status, SessionStatus::Open);

    let report = engine.return_to_bot(&sid, Some("a")).await.unwrap();
    assert_eq!(report.outcome, TurnOutcome::Ended);
    assert_eq!(report.session.status, SessionStatus::Bot);
    assert_eq!(report.session.last_message().unwrap().text, "De volta ao bot");
    assert_eq!(report.session.agent_id, None);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_missing_anchor_halts_and_retries_after_fix() {
    let (engine, _) = engine();
    let flow_id = publish(
        &engine,
        json!({
            "nodes": [
                {"id": "start", "type": "start"},
                {"id": "g", "type": "goto", "data": {"targetAnchor": "fim"}}
            ],
            "edges": [{"id": "e1", "source": "start", "target": "g"}]
        }),
    );

    let report = engine.start_session(&flow_id).await.unwrap();
    assert_eq!(report.outcome, TurnOutcome::Halted);
    assert_eq!(report.session.last_message().unwrap().text, "[erro] graph integrity: anchor 'fim' not found");
    let sid = report.session.id.clone();

    republish(
        &engine,
        &flow_id,
        json!({
            "nodes": [
                {"id": "start", "type": "start"},
                {"id": "g", "type": "goto", "data": {"targetAnchor": "fim"}},
                {"id": "a", "type": "anchor", "data": {"anchorName": "fim"}},
                {"id": "m", "type": "message", "data": {"text": "Achei"}}
            ],
            "edges": [
                {"id": "e1", "source": "start", "target": "g"},
                {"id": "e2", "source": "a", "target": "m"}
            ]
        }),
    );

    let report = engine.submit_user_text(&sid, "de novo").await.unwrap();
    assert_eq!(report.outcome, TurnOutcome::Ended);
    assert_eq!(report.session.last_message().unwrap().text, "Achei");
    assert_eq!(report.session.flow_version, 2);
    assert!(report.session.halt.is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unmatched_condition_leaves_session_stuck() {
    let (engine, _) = engine();
    let flow_id = publish(
        &engine,
        json!({
            "nodes": [
                {"id": "start", "type": "start"},
                {"id": "c", "type": "condition", "data": {
                    "hasElse": false,
                    "conditions": [{"id": "gold", "variable": "plano", "operator": "==", "value": "gold"}]
                }},
                {"id": "m", "type": "message", "data": {"text": "vip"}}
            ],
            "edges": [
                {"id": "e1", "source": "start", "target": "c"},
                {"id": "e2", "source": "c", "target": "m", "sourceHandle": "gold"}
            ]
        }),
    );

    let report = engine.start_session(&flow_id).await.unwrap();
    assert_eq!(report.outcome, TurnOutcome::Halted);
    let halt = report.session.halt.clone().unwrap();
    assert_eq!(halt.kind, HaltKind::Unmatched);
    assert!(!halt.retryable);
    assert_eq!(report.session.current_node_id, None);

    let err = engine.submit_user_text(&report.session.id, "e agora?").await.unwrap_err();
    assert!(matches!(err, ChatflowError::Session(_)));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_step_budget_stops_loops() {
    let (engine, _) = engine_with(Config {
        engine: EngineSettings {
            max_steps_per_turn: 10,
            ..Default::default()
        },
        ..Default::default()
    });
    let flow_id = publish(
        &engine,
        json!({
            "nodes": [
                {"id": "start", "type": "start"},
                {"id": "a", "type": "anchor", "data": {"anchorName": "topo"}},
                {"id": "g", "type": "goto", "data": {"targetAnchor": "topo"}}
            ],
            "edges": [
                {"id": "e1", "source": "start", "target": "a"},
                {"id": "e2", "source": "a", "target": "g"}
            ]
        }),
    );

    let report = engine.start_session(&flow_id).await.unwrap();
    assert_eq!(report.outcome, TurnOutcome::Halted);
    assert_eq!(report.steps, 10);
    assert_eq!(report.session.halt.unwrap().kind, HaltKind::StepBudget);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_script_failure_is_reported() {
    let (engine, _) = engine();
    let flow_id = publish(
        &engine,
        json!({
            "nodes": [
                {"id": "start", "type": "start"},
                {"id": "ok", "type": "script", "data": {"script": "return { total: 2 * 21 };"}},
                {"id": "m", "type": "message", "data": {"text": "total {total}"}},
                {"id": "bad", "type": "script", "data": {"script": "throw new Error('boom');"}},
                {"id": "n", "type": "message", "data": {"text": "nunca"}}
            ],
            "edges": [
                {"id": "e1", "source": "start", "target": "ok"},
                {"id": "e2", "source": "ok", "target": "m"},
                {"id": "e3", "source": "m", "target": "bad"},
                {"id": "e4", "source": "bad", "target": "n"}
            ]
        }),
    );

    let report = engine.start_session(&flow_id).await.unwrap();
    assert_eq!(report.outcome, TurnOutcome::Halted);
    assert_eq!(bot_texts(&report.session.messages), vec!["total 42", "[erro] script: boom"]);
    assert_eq!(report.session.halt.unwrap().kind, HaltKind::Script);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_resume_binding() {
    let graph = |text: &str| {
        json!({
            "nodes": [
                {"id": "start", "type": "start"},
                {"id": "i", "type": "input", "data": {"text": "Nome?", "variableName": "nome"}},
                {"id": "m", "type": "message", "data": {"text": text}}
            ],
            "edges": [
                {"id": "e1", "source": "start", "target": "i"},
                {"id": "e2", "source": "i", "target": "m"}
            ]
        })
    };

    for (binding, expected) in [(ResumeBinding::Latest, "v2 Ana"), (ResumeBinding::Pinned, "v1 Ana")] {
        let (engine, _) = engine_with(Config {
            engine: EngineSettings {
                resume_binding: binding,
                ..Default::default()
            },
            ..Default::default()
        });
        let flow_id = publish(&engine, graph("v1 {nome}"));
        let report = engine.start_session(&flow_id).await.unwrap();
        assert_eq!(report.outcome, TurnOutcome::Paused);

        republish(&engine, &flow_id, graph("v2 {nome}"));
        let report = engine.submit_user_text(&report.session.id, "Ana").await.unwrap();
        assert_eq!(report.session.last_message().unwrap().text, expected);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_force_close_cancels_a_delay() {
    let (engine, recorder) = engine();
    let flow_id = publish(
        &engine,
        json!({
            "nodes": [
                {"id": "start", "type": "start"},
                {"id": "d", "type": "delay", "data": {"delay": 30}},
                {"id": "m", "type": "message", "data": {"text": "depois"}}
            ],
            "edges": [
                {"id": "e1", "source": "start", "target": "d"},
                {"id": "e2", "source": "d", "target": "m"}
            ]
        }),
    );

    let running = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.start_session(&flow_id).await })
    };

    let mut sid = None;
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        let procs = engine.procs.read().unwrap().keys().cloned().collect::<Vec<_>>();
        if let Some(id) = procs.into_iter().next() {
            sid = Some(id);
            break;
        }
    }
    let sid = sid.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let report = tokio::time::timeout(Duration::from_secs(5), engine.force_close_session(&sid)).await.unwrap().unwrap();
    assert_eq!(report.outcome, TurnOutcome::Closed);

    let aborted = tokio::time::timeout(Duration::from_secs(5), running).await.unwrap().unwrap().unwrap();
    assert_eq!(aborted.outcome, TurnOutcome::Aborted);

    let session = engine.get_session(&sid).unwrap();
    assert_eq!(session.status, SessionStatus::Closed);
    assert!(!bot_texts(&session.messages).contains(&"depois".to_string()));
    assert!(!recorder.calls().contains(&"message:depois".to_string()));
    assert!(matches!(engine.submit_user_text(&sid, "oi").await, Err(ChatflowError::Session(_))));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_buttons_by_click_or_typed_label() {
    let (engine, _) = engine();
    let flow_id = publish(
        &engine,
        json!({
            "nodes": [
                {"id": "start", "type": "start", "data": {"text": "Bem-vindo"}},
                {"id": "t", "type": "template", "data": {
                    "text": "Escolha",
                    "buttons": [{"id": "b1", "label": "Vendas"}, {"id": "b2", "label": "Suporte"}]
                }},
                {"id": "c1", "type": "case", "data": {"buttonId": "b1"}},
                {"id": "c2", "type": "case", "data": {"buttonId": "b2"}},
                {"id": "m1", "type": "message", "data": {"text": "Vendas aqui"}},
                {"id": "m2", "type": "message", "data": {"text": "Suporte aqui"}}
            ],
            "edges": [
                {"id": "e1", "source": "start", "target": "t"},
                {"id": "e2", "source": "t", "target": "c1"},
                {"id": "e3", "source": "t", "target": "c2"},
                {"id": "e4", "source": "c1", "target": "m1"},
                {"id": "e5", "source": "c2", "target": "m2"}
            ]
        }),
    );

    let report = engine.start_session(&flow_id).await.unwrap();
    assert_eq!(bot_texts(&report.session.messages), vec!["Bem-vindo", "Escolha"]);
    assert_eq!(report.session.last_message().unwrap().buttons.as_ref().unwrap().len(), 2);
    let report = engine.submit_button_click(&report.session.id, "b1", "Vendas").await.unwrap();
    assert_eq!(report.session.last_message().unwrap().text, "Vendas aqui");

    let report = engine.start_session(&flow_id).await.unwrap();
    let report = engine.submit_user_text(&report.session.id, "suporte").await.unwrap();
    assert_eq!(report.session.last_message().unwrap().text, "Suporte aqui");

    let err = engine.submit_button_click(&report.session.id, "b1", "Vendas").await.unwrap_err();
    assert!(matches!(err, ChatflowError::Session(_)));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_recover_interrupted_turn() {
    let (engine, _) = engine();
    let flow_id = publish(
        &engine,
        json!({
            "nodes": [
                {"id": "start", "type": "start"},
                {"id": "m", "type": "message", "data": {"text": "Oi"}},
                {"id": "i", "type": "input", "data": {"variableName": "x"}}
            ],
            "edges": [
                {"id": "e1", "source": "start", "target": "m"},
                {"id": "e2", "source": "m", "target": "i"}
            ]
        }),
    );
    let report = engine.start_session(&flow_id).await.unwrap();
    let sid = report.session.id.clone();
    assert!(matches!(engine.recover_session(&sid).await, Err(ChatflowError::Session(_))));

    // as if the process died right after the start node
    let mut session = report.session;
    session.current_node_id = None;
    session.pending_node_id = Some("m".to_string());
    engine.services.store.save_session(&session).unwrap();

    let report = engine.recover_session(&sid).await.unwrap();
    assert_eq!(report.outcome, TurnOutcome::Paused);
    assert_eq!(bot_texts(&report.session.messages), vec!["Oi", "Oi"]);
    assert_eq!(report.session.pending_node_id, None);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_entry_point_errors() {
    let (engine, _) = engine();
    assert!(matches!(engine.submit_user_text("nope", "oi").await, Err(ChatflowError::Session(_))));

    let flow = engine.create_flow("vazio").unwrap();
    assert!(matches!(engine.start_session(&flow.id).await, Err(ChatflowError::Flow(_))));

    let bad = json!({
        "nodes": [
            {"id": "start", "type": "start"},
            {"id": "x", "type": "subflow"}
        ],
        "edges": []
    });
    engine.save_draft(&flow.id, serde_json::from_value(bad).unwrap()).unwrap();
    assert!(engine.publish(&flow.id).is_err());
    assert_eq!(engine.get_flow(&flow.id).unwrap().version, 0);

    engine.shutdown();
    assert!(matches!(engine.start_session(&flow.id).await, Err(ChatflowError::Engine(_))));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_concurrent_replies_run_one_after_the_other() {
    let (engine, _) = engine();
    let flow_id = publish(
        &engine,
        json!({
            "nodes": [
                {"id": "start", "type": "start"},
                {"id": "i1", "type": "input", "data": {"variableName": "a"}},
                {"id": "d", "type": "delay", "data": {"delay": 0.3}},
                {"id": "i2", "type": "input", "data": {"variableName": "b"}},
                {"id": "f", "type": "final", "data": {"text": "Fim"}}
            ],
            "edges": [
                {"id": "e1", "source": "start", "target": "i1"},
                {"id": "e2", "source": "i1", "target": "d"},
                {"id": "e3", "source": "d", "target": "i2"},
                {"id": "e4", "source": "i2", "target": "f"}
            ]
        }),
    );
    let sid = engine.start_session(&flow_id).await.unwrap().session.id;

    let (first, second) = tokio::join!(engine.submit_user_text(&sid, "x"), engine.submit_user_text(&sid, "y"));
    assert_eq!(first.unwrap().outcome, TurnOutcome::Paused);
    assert_eq!(second.unwrap().outcome, TurnOutcome::Closed);

    let session = engine.get_session(&sid).unwrap();
    assert_eq!(session.variables.get::<String>("a").as_deref(), Some("x"));
    assert_eq!(session.variables.get::<String>("b").as_deref(), Some("y"));
    let replies = session.messages.iter().filter(|m| m.sender == Sender::User).map(|m| m.text.as_str()).collect::<Vec<_>>();
    assert_eq!(replies, vec!["x", "y"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_idle_sessions_release_their_process() {
    let (engine, _) = engine();
    let flow_id = publish(
        &engine,
        json!({
            "nodes": [
                {"id": "start", "type": "start"},
                {"id": "i", "type": "input", "data": {"variableName": "nome"}},
                {"id": "m", "type": "message", "data": {"text": "Olá {nome}"}}
            ],
            "edges": [
                {"id": "e1", "source": "start", "target": "i"},
                {"id": "e2", "source": "i", "target": "m"}
            ]
        }),
    );

    let mut sids = Vec::new();
    for _ in 0..20 {
        sids.push(engine.start_session(&flow_id).await.unwrap().session.id);
    }

    let mut live = usize::MAX;
    for _ in 0..100 {
        live = engine.procs.read().unwrap().len();
        if live == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(live, 0);

    let report = engine.submit_user_text(&sids[0], "Ana").await.unwrap();
    assert_eq!(report.outcome, TurnOutcome::Ended);
    assert_eq!(report.session.last_message().unwrap().text, "Olá Ana");
}
