//! Template engine for generated broadcast payloads.
//!
//! Uses Handlebars to render the string fields of a context's payload
//! template on every publisher tick.

use chrono::{DateTime, Utc};
use handlebars::{handlebars_helper, Handlebars};
use serde::Serialize;
use serde_json::Value;

/// Values available to payload templates.
#[derive(Debug, Clone, Serialize)]
pub struct TickContext {
    /// Context name
    pub context: String,
    /// Tick sequence number, starting at 1
    pub seq: u64,
    /// Live subscribers of the context
    pub connections: u64,
    /// Tick time, RFC 3339
    pub timestamp: String,
}

impl TickContext {
    pub fn new(context: &str, seq: u64, connections: u64, at: DateTime<Utc>) -> Self {
        Self {
            context: context.to_string(),
            seq,
            connections,
            timestamp: at.to_rfc3339(),
        }
    }
}

/// Template engine for rendering payloads.
pub struct TemplateEngine {
    handlebars: Handlebars<'static>,
}

handlebars_helper!(upper: |s: str| s.to_uppercase());
handlebars_helper!(lower: |s: str| s.to_lowercase());

impl TemplateEngine {
    pub fn new() -> Self {
        let mut handlebars = Handlebars::new();

        handlebars.register_helper("upper", Box::new(upper));
        handlebars.register_helper("lower", Box::new(lower));
        handlebars.register_helper("json", Box::new(json_helper));
        handlebars.register_helper("uuid", Box::new(uuid_helper));
        handlebars.register_helper("now", Box::new(now_helper));
        handlebars.register_helper("random", Box::new(random_helper));
        handlebars.register_helper("default", Box::new(default_helper));

        // Payloads are JSON, not HTML
        handlebars.register_escape_fn(handlebars::no_escape);

        Self { handlebars }
    }

    pub fn render(
        &self,
        template: &str,
        ctx: &TickContext,
    ) -> Result<String, handlebars::RenderError> {
        self.handlebars.render_template(template, ctx)
    }

    /// Render every string containing `{{` in a JSON payload template.
    pub fn render_payload(
        &self,
        template: &Value,
        ctx: &TickContext,
    ) -> Result<Value, handlebars::RenderError> {
        match template {
            Value::String(s) if s.contains("{{") => Ok(Value::String(self.render(s, ctx)?)),
            Value::Array(items) => items
                .iter()
                .map(|v| self.render_payload(v, ctx))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Value::Object(fields) => {
                let mut rendered = serde_json::Map::with_capacity(fields.len());
                for (k, v) in fields {
                    rendered.insert(k.clone(), self.render_payload(v, ctx)?);
                }
                Ok(Value::Object(rendered))
            }
            _ => Ok(template.clone()),
        }
    }
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Check that every templated string of a payload parses.
pub fn check_payload(template: &Value) -> Result<(), String> {
    match template {
        Value::String(s) if s.contains("{{") => handlebars::Template::compile(s)
            .map(|_| ())
            .map_err(|e| e.to_string()),
        Value::Array(items) => items.iter().try_for_each(check_payload),
        Value::Object(fields) => fields.values().try_for_each(check_payload),
        _ => Ok(()),
    }
}

/// Payload used for contexts without a template.
pub fn default_payload() -> Value {
    serde_json::json!({
        "context": "{{context}}",
        "seq": "{{seq}}",
        "timestamp": "{{timestamp}}",
    })
}

fn json_helper(
    h: &handlebars::Helper,
    _: &Handlebars,
    _: &handlebars::Context,
    _: &mut handlebars::RenderContext,
    out: &mut dyn handlebars::Output,
) -> handlebars::HelperResult {
    let value = h.param(0).map(|p| p.value().clone()).unwrap_or(Value::Null);
    out.write(&value.to_string())?;
    Ok(())
}

fn uuid_helper(
    _: &handlebars::Helper,
    _: &Handlebars,
    _: &handlebars::Context,
    _: &mut handlebars::RenderContext,
    out: &mut dyn handlebars::Output,
) -> handlebars::HelperResult {
    use rand::Rng;
    let bytes: [u8; 16] = rand::thread_rng().gen();
    let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
    // Version 4, RFC 4122 variant
    let variant = ['8', '9', 'a', 'b'][(bytes[8] & 0x03) as usize];
    out.write(&format!(
        "{}-{}-4{}-{}{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[13..16],
        variant,
        &hex[17..20],
        &hex[20..32],
    ))?;
    Ok(())
}

fn now_helper(
    h: &handlebars::Helper,
    _: &Handlebars,
    _: &handlebars::Context,
    _: &mut handlebars::RenderContext,
    out: &mut dyn handlebars::Output,
) -> handlebars::HelperResult {
    let format = h
        .param(0)
        .and_then(|p| p.value().as_str())
        .unwrap_or("%Y-%m-%dT%H:%M:%S%.3fZ");
    out.write(&Utc::now().format(format).to_string())?;
    Ok(())
}

fn random_helper(
    h: &handlebars::Helper,
    _: &Handlebars,
    _: &handlebars::Context,
    _: &mut handlebars::RenderContext,
    out: &mut dyn handlebars::Output,
) -> handlebars::HelperResult {
    use rand::Rng;
    let min = h.param(0).and_then(|p| p.value().as_i64()).unwrap_or(0);
    let max = h.param(1).and_then(|p| p.value().as_i64()).unwrap_or(100);
    let (low, high) = if min <= max { (min, max) } else { (max, min) };
    out.write(&rand::thread_rng().gen_range(low..=high).to_string())?;
    Ok(())
}

fn default_helper(
    h: &handlebars::Helper,
    _: &Handlebars,
    _: &handlebars::Context,
    _: &mut handlebars::RenderContext,
    out: &mut dyn handlebars::Output,
) -> handlebars::HelperResult {
    let fallback = h.param(1).and_then(|p| p.value().as_str()).unwrap_or("");
    let rendered = match h.param(0).map(|p| p.value()) {
        Some(Value::Null) | None => fallback.to_string(),
        Some(Value::String(s)) if s.is_empty() => fallback.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    };
    out.write(&rendered)?;
    Ok(())
}
