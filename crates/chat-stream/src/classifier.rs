//! Maps decoded wire frames onto [`TurnEvent`]s.
//!
//! Unknown frame types classify to nothing so backend additions do not break
//! older clients. Malformed frames come back as [`FrameError`]s for the
//! caller to log and skip.
use serde::Deserialize;

use crate::config::WireProtocol;
use crate::decoder::RawFrame;
use crate::errors::FrameError;
use crate::frame::{StreamFrame, ThoughtDelta, TurnEvent};
use crate::message::SourceDetail;

/// Classifies one raw frame.
///
/// `fallback_id` is used as the correlation id when the frame carries none
/// (SSE bodies never do unless `data.msg_id` is present).
pub fn classify(
    protocol: WireProtocol,
    raw: &RawFrame,
    fallback_id: &str,
) -> Vec<Result<StreamFrame, FrameError>> {
    let data = raw.data.trim();
    if data.is_empty() || data == "[DONE]" {
        return Vec::new();
    }
    match serde_json::from_str::<serde_json::Value>(data) {
        Ok(value) => classify_value(protocol, raw.event.as_deref(), value, fallback_id)
            .transpose()
            .into_iter()
            .collect(),
        Err(_) if raw.event.as_deref() == Some("error") => vec![Ok(StreamFrame::new(
            fallback_id,
            TurnEvent::Error(data.to_string()),
        ))],
        // Some backends put one JSON document on each `data:` line.
        Err(_) if data.contains('\n') => data
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .filter_map(|line| {
                serde_json::from_str::<serde_json::Value>(line)
                    .map_err(|e| FrameError::invalid_json(&e))
                    .and_then(|value| {
                        classify_value(protocol, raw.event.as_deref(), value, fallback_id)
                    })
                    .transpose()
            })
            .collect(),
        Err(err) => vec![Err(FrameError::invalid_json(&err))],
    }
}

fn classify_value(
    protocol: WireProtocol,
    sse_event: Option<&str>,
    value: serde_json::Value,
    fallback_id: &str,
) -> Result<Option<StreamFrame>, FrameError> {
    match protocol {
        WireProtocol::Ndjson => classify_ndjson(value, fallback_id),
        WireProtocol::Sse => classify_sse(sse_event, value, fallback_id),
    }
}

#[derive(Deserialize)]
struct NdjsonFrame {
    #[serde(default)]
    msg_id: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    content: serde_json::Value,
    #[serde(default)]
    strategy_id: Option<String>,
}

#[derive(Deserialize)]
struct ToolStepPayload {
    id: String,
    #[serde(default)]
    tool_name: String,
    #[serde(default)]
    tool_type: String,
    #[serde(default)]
    description: String,
}

impl From<ToolStepPayload> for ThoughtDelta {
    fn from(value: ToolStepPayload) -> Self {
        Self {
            step_id: value.id,
            tool_name: value.tool_name,
            tool_type: value.tool_type,
            description: value.description,
            progress: None,
        }
    }
}

fn classify_ndjson(
    value: serde_json::Value,
    fallback_id: &str,
) -> Result<Option<StreamFrame>, FrameError> {
    let frame: NdjsonFrame =
        serde_json::from_value(value).map_err(|e| FrameError::invalid_json(&e))?;
    let Some(kind) = frame.kind else {
        return Err(FrameError::MissingField { field: "type" });
    };
    let correlation_id = frame
        .msg_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| fallback_id.to_string());

    let event = match kind.as_str() {
        "temp" => {
            let step = decode_embedded::<ToolStepPayload>("temp", &frame.content)?;
            TurnEvent::ThoughtDelta(step.into())
        }
        "thinking_detail" => {
            TurnEvent::ThoughtDelta(detail_delta("thinking_detail", &frame.content))
        }
        "tool_result_detail" => {
            TurnEvent::ThoughtDelta(detail_delta("tool_result_detail", &frame.content))
        }
        "source_list_details" => TurnEvent::SourceList(decode_embedded::<Vec<SourceDetail>>(
            "source_list_details",
            &frame.content,
        )?),
        "final_answer" => TurnEvent::AnswerDelta(content_text(&frame.content)),
        "end_thinking" => TurnEvent::EndOfTurn { result: None },
        "error" => TurnEvent::Error(content_text(&frame.content)),
        other => {
            tracing::debug!(frame_type = other, "ignoring unknown frame type");
            return Ok(None);
        }
    };
    Ok(Some(
        StreamFrame::new(correlation_id, event).with_strategy_id(frame.strategy_id),
    ))
}

/// Decodes a payload that is either JSON-encoded inside a string or inline.
fn decode_embedded<T: serde::de::DeserializeOwned>(
    kind: &'static str,
    content: &serde_json::Value,
) -> Result<T, FrameError> {
    let result = match content {
        serde_json::Value::String(text) => serde_json::from_str(text),
        serde_json::Value::Null => return Err(FrameError::MissingField { field: "content" }),
        other => T::deserialize(other),
    };
    result.map_err(|e| FrameError::invalid_payload(kind, e.to_string()))
}

/// Detail frames either reuse the `temp` step shape or carry a bare text
/// fragment for a step named after the frame type.
fn detail_delta(kind: &'static str, content: &serde_json::Value) -> ThoughtDelta {
    if let Ok(step) = decode_embedded::<ToolStepPayload>(kind, content) {
        return step.into();
    }
    ThoughtDelta {
        step_id: kind.to_string(),
        tool_name: String::new(),
        tool_type: kind.to_string(),
        description: content_text(content),
        progress: None,
    }
}

fn content_text(content: &serde_json::Value) -> String {
    match content {
        serde_json::Value::String(text) => text.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[derive(Deserialize)]
struct SseBody {
    step: Option<String>,
    #[serde(default)]
    message: String,
    #[serde(default)]
    progress: Option<f64>,
    #[serde(default)]
    data: Option<serde_json::Value>,
    #[serde(default)]
    result: Option<serde_json::Value>,
}

fn classify_sse(
    sse_event: Option<&str>,
    value: serde_json::Value,
    fallback_id: &str,
) -> Result<Option<StreamFrame>, FrameError> {
    let body: SseBody =
        serde_json::from_value(value).map_err(|e| FrameError::invalid_json(&e))?;
    let correlation_id = body
        .data
        .as_ref()
        .and_then(|data| data.get("msg_id"))
        .and_then(|id| id.as_str())
        .filter(|id| !id.trim().is_empty())
        .unwrap_or(fallback_id)
        .to_string();
    let step = match (body.step, sse_event) {
        (Some(step), _) => step,
        (None, Some("error")) => "error".to_string(),
        (None, _) => return Err(FrameError::MissingField { field: "step" }),
    };

    let event = if step == "complete" {
        TurnEvent::EndOfTurn {
            result: body.result,
        }
    } else if step == "error" {
        TurnEvent::Error(body.message)
    } else {
        TurnEvent::ThoughtDelta(ThoughtDelta {
            tool_name: step.clone(),
            step_id: step,
            tool_type: "progress".to_string(),
            description: body.message,
            progress: body.progress,
        })
    };
    Ok(Some(StreamFrame::new(correlation_id, event)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameKind;

    fn ndjson(line: &str) -> Vec<Result<StreamFrame, FrameError>> {
        classify(
            WireProtocol::Ndjson,
            &RawFrame {
                event: None,
                data: line.to_string(),
            },
            "fallback",
        )
    }

    fn sse(data: &str) -> Vec<Result<StreamFrame, FrameError>> {
        classify(
            WireProtocol::Sse,
            &RawFrame {
                event: Some("message".into()),
                data: data.to_string(),
            },
            "turn-1",
        )
    }

    fn single(frames: Vec<Result<StreamFrame, FrameError>>) -> StreamFrame {
        assert_eq!(frames.len(), 1, "expected exactly one frame");
        frames.into_iter().next().expect("frame").expect("classified")
    }

    #[test]
    fn final_answer_is_answer_delta() {
        let frame = single(ndjson(
            r#"{"msg_id":"m1","type":"final_answer","content":"Hel","strategy_id":"s9"}"#,
        ));
        assert_eq!(frame.correlation_id, "m1");
        assert_eq!(frame.event, TurnEvent::AnswerDelta("Hel".into()));
        assert_eq!(frame.strategy_id.as_deref(), Some("s9"));
    }

    #[test]
    fn temp_content_is_decoded_as_tool_step() {
        let frame = single(ndjson(
            r#"{"msg_id":"m1","type":"temp","content":"{\"id\":\"s1\",\"tool_name\":\"price_feed\",\"tool_type\":\"market\",\"description\":\"Fetching\"}"}"#,
        ));
        let TurnEvent::ThoughtDelta(delta) = frame.event else {
            panic!("expected thought delta");
        };
        assert_eq!(delta.step_id, "s1");
        assert_eq!(delta.tool_name, "price_feed");
        assert_eq!(delta.tool_type, "market");
        assert_eq!(delta.description, "Fetching");
    }

    #[test]
    fn plain_detail_frames_key_on_frame_type() {
        let frame = single(ndjson(
            r#"{"msg_id":"m1","type":"tool_result_detail","content":"3 rows"}"#,
        ));
        let TurnEvent::ThoughtDelta(delta) = frame.event else {
            panic!("expected thought delta");
        };
        assert_eq!(delta.step_id, "tool_result_detail");
        assert_eq!(delta.description, "3 rows");
    }

    #[test]
    fn source_list_accepts_string_and_inline_arrays() {
        let encoded = single(ndjson(
            r#"{"msg_id":"m1","type":"source_list_details","content":"[{\"id\":\"1\",\"title\":\"A\",\"description\":\"a\"}]"}"#,
        ));
        let inline = single(ndjson(
            r#"{"msg_id":"m1","type":"source_list_details","content":[{"id":"1","title":"A","description":"a"}]}"#,
        ));
        assert_eq!(encoded.event, inline.event);
        assert_eq!(encoded.kind(), FrameKind::SourceList);
    }

    #[test]
    fn end_thinking_and_error_kinds() {
        let end = single(ndjson(r#"{"msg_id":"m1","type":"end_thinking"}"#));
        assert_eq!(end.kind(), FrameKind::EndOfTurn);
        let err = single(ndjson(r#"{"msg_id":"m1","type":"error","content":"rate limited"}"#));
        assert_eq!(err.event, TurnEvent::Error("rate limited".into()));
    }

    #[test]
    fn unknown_type_is_ignored() {
        assert!(ndjson(r#"{"msg_id":"m1","type":"heartbeat","content":""}"#).is_empty());
    }

    #[test]
    fn malformed_frames_are_errors() {
        assert!(matches!(
            ndjson("not json").as_slice(),
            [Err(FrameError::InvalidJson { .. })]
        ));
        assert!(matches!(
            ndjson(r#"{"msg_id":"m1"}"#).as_slice(),
            [Err(FrameError::MissingField { field: "type" })]
        ));
        assert!(matches!(
            ndjson(r#"{"msg_id":"m1","type":"temp","content":"{oops"}"#).as_slice(),
            [Err(FrameError::InvalidPayload { kind: "temp", .. })]
        ));
    }

    #[test]
    fn missing_msg_id_uses_fallback() {
        let frame = single(ndjson(r#"{"type":"final_answer","content":"x"}"#));
        assert_eq!(frame.correlation_id, "fallback");
    }

    #[test]
    fn sse_steps_map_to_thoughts_and_complete() {
        let progress = single(sse(
            r#"{"step":"analyzing","message":"Reading order book","progress":40,"timestamp":"t"}"#,
        ));
        assert_eq!(progress.correlation_id, "turn-1");
        let TurnEvent::ThoughtDelta(delta) = progress.event else {
            panic!("expected thought delta");
        };
        assert_eq!(delta.step_id, "analyzing");
        assert_eq!(delta.progress, Some(40.0));

        let complete = single(sse(
            r#"{"step":"complete","message":"done","timestamp":"t","result":{"strategy":"grid"}}"#,
        ));
        assert_eq!(
            complete.event,
            TurnEvent::EndOfTurn {
                result: Some(serde_json::json!({"strategy":"grid"}))
            }
        );
    }

    #[test]
    fn sse_msg_id_in_data_overrides_fallback() {
        let frame = single(sse(
            r#"{"step":"error","message":"backend down","timestamp":"t","data":{"msg_id":"m7"}}"#,
        ));
        assert_eq!(frame.correlation_id, "m7");
        assert_eq!(frame.event, TurnEvent::Error("backend down".into()));
    }

    #[test]
    fn sse_one_document_per_data_line() {
        let frames = sse("{\"step\":\"a\",\"message\":\"x\"}\n{\"step\":\"b\",\"message\":\"y\"}");
        assert_eq!(frames.len(), 2);
        assert!(frames.iter().all(Result::is_ok));
    }

    #[test]
    fn sse_done_marker_is_ignored() {
        assert!(sse("[DONE]").is_empty());
    }
}
