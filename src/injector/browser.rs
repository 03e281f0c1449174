//! `PageSurface` for a Chrome tab, driven through `Runtime.evaluate`

use super::page::{ElementRef, Notice, NoticeKind, PageError, PageSurface};
use crate::cdp::CdpPage;
use async_trait::async_trait;
use serde_json::Value;

const NOTIFICATION_ID: &str = "gesturelink-notification";

/// Window property holding the agent session token
const SESSION_PROPERTY: &str = "__gesturelinkSession";

/// JS string literal for `text`
fn js_string(text: &str) -> String {
    Value::from(text).to_string()
}

/// Expression resolving to the referenced element (or undefined)
fn element_expr(element: &ElementRef) -> String {
    format!(
        "document.querySelectorAll({})[{}]",
        js_string(&element.selector),
        element.index
    )
}

fn find_visible_script(selector: &str) -> String {
    format!(
        r#"(() => {{
  const els = document.querySelectorAll({sel});
  for (let i = 0; i < els.length; i++) {{
    if (els[i].offsetParent !== null) return i;
  }}
  return -1;
}})()"#,
        sel = js_string(selector)
    )
}

/// Uses the prototype's value setter so framework-managed inputs see the
/// change, then fires the events those frameworks listen for.
fn fill_script(element: &ElementRef, text: &str) -> String {
    format!(
        r#"(() => {{
  const el = {el};
  if (!el) return false;
  el.focus();
  const proto = el instanceof HTMLTextAreaElement
    ? HTMLTextAreaElement.prototype
    : el instanceof HTMLInputElement ? HTMLInputElement.prototype : null;
  const desc = proto && Object.getOwnPropertyDescriptor(proto, "value");
  if (desc && desc.set) {{
    desc.set.call(el, {text});
  }} else {{
    el.value = {text};
  }}
  el.dispatchEvent(new Event("input", {{ bubbles: true, cancelable: true }}));
  el.dispatchEvent(new Event("change", {{ bubbles: true, cancelable: true }}));
  return true;
}})()"#,
        el = element_expr(element),
        text = js_string(text)
    )
}

fn press_enter_script(element: &ElementRef) -> String {
    format!(
        r#"(() => {{
  const el = {el};
  if (!el) return false;
  for (const type of ["keydown", "keypress", "keyup"]) {{
    el.dispatchEvent(new KeyboardEvent(type, {{
      key: "Enter", code: "Enter", keyCode: 13, which: 13,
      bubbles: true, cancelable: true
    }}));
  }}
  return true;
}})()"#,
        el = element_expr(element)
    )
}

/// Dispatches a MouseEvent rather than calling `click()`, which SVG
/// elements lack.
fn click_script(element: &ElementRef) -> String {
    format!(
        r#"(() => {{
  const el = {el};
  if (!el) return false;
  el.dispatchEvent(new MouseEvent("click", {{ bubbles: true, cancelable: true, view: window }}));
  return true;
}})()"#,
        el = element_expr(element)
    )
}

fn read_value_script(element: &ElementRef) -> String {
    format!(
        r#"(() => {{
  const el = {el};
  if (!el) return null;
  return typeof el.value === "string" ? el.value : (el.textContent || "");
}})()"#,
        el = element_expr(element)
    )
}

fn notify_script(notice: &Notice) -> String {
    let background = match notice.kind {
        NoticeKind::Gesture => "linear-gradient(135deg, #10b981, #059669)",
        NoticeKind::Error => "linear-gradient(135deg, #ef4444, #b91c1c)",
    };
    format!(
        r#"(() => {{
  const id = {id};
  const existing = document.getElementById(id);
  if (existing) existing.remove();
  const box = document.createElement("div");
  box.id = id;
  const icon = document.createElement("div");
  icon.style.cssText = "font-size: 24px; margin-bottom: 8px;";
  icon.textContent = {icon};
  const text = document.createElement("div");
  text.style.cssText = "font-weight: 600; font-size: 14px;";
  text.textContent = {text};
  box.appendChild(icon);
  box.appendChild(text);
  box.style.cssText = "position: fixed; top: 20px; right: 20px; background: {background};"
    + " color: white; padding: 16px 24px; border-radius: 12px; z-index: 100001;"
    + " text-align: center; box-shadow: 0 8px 32px rgba(0, 0, 0, 0.3);"
    + " font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;";
  document.body.appendChild(box);
  setTimeout(() => box.remove(), {ms});
  return true;
}})()"#,
        id = js_string(NOTIFICATION_ID),
        icon = js_string(&notice.icon),
        text = js_string(&notice.text),
        background = background,
        ms = notice.duration.as_millis()
    )
}

fn mark_session_script(token: &str) -> String {
    format!(
        "(() => {{ window[{prop}] = {token}; return true; }})()",
        prop = js_string(SESSION_PROPERTY),
        token = js_string(token)
    )
}

fn has_session_script(token: &str) -> String {
    format!(
        "window[{prop}] === {token}",
        prop = js_string(SESSION_PROPERTY),
        token = js_string(token)
    )
}

/// `true` from the page, or the element has gone away
fn expect_attached(value: Value, element: &ElementRef) -> Result<(), PageError> {
    match value {
        Value::Bool(true) => Ok(()),
        Value::Bool(false) => Err(PageError::Detached(element.selector.clone())),
        other => Err(PageError::Unexpected(other.to_string())),
    }
}

#[async_trait]
impl PageSurface for CdpPage {
    async fn find_visible(&self, selector: &str) -> Result<Option<ElementRef>, PageError> {
        let value = self.evaluate(&find_visible_script(selector)).await?;
        let index = value
            .as_i64()
            .ok_or_else(|| PageError::Unexpected(value.to_string()))?;

        Ok(usize::try_from(index).ok().map(|index| ElementRef {
            selector: selector.to_string(),
            index,
        }))
    }

    async fn fill(&self, element: &ElementRef, text: &str) -> Result<(), PageError> {
        let value = self.evaluate(&fill_script(element, text)).await?;
        expect_attached(value, element)
    }

    async fn press_enter(&self, element: &ElementRef) -> Result<(), PageError> {
        let value = self.evaluate(&press_enter_script(element)).await?;
        expect_attached(value, element)
    }

    async fn click(&self, element: &ElementRef) -> Result<(), PageError> {
        let value = self.evaluate(&click_script(element)).await?;
        expect_attached(value, element)
    }

    async fn read_value(&self, element: &ElementRef) -> Result<String, PageError> {
        match self.evaluate(&read_value_script(element)).await? {
            Value::String(value) => Ok(value),
            Value::Null => Err(PageError::Detached(element.selector.clone())),
            other => Err(PageError::Unexpected(other.to_string())),
        }
    }

    async fn notify(&self, notice: &Notice) -> Result<(), PageError> {
        self.evaluate(&notify_script(notice)).await?;
        Ok(())
    }

    async fn mark_session(&self, token: &str) -> Result<(), PageError> {
        match self.evaluate(&mark_session_script(token)).await? {
            Value::Bool(true) => Ok(()),
            other => Err(PageError::Unexpected(other.to_string())),
        }
    }

    async fn has_session(&self, token: &str) -> Result<bool, PageError> {
        match self.evaluate(&has_session_script(token)).await? {
            Value::Bool(marked) => Ok(marked),
            other => Err(PageError::Unexpected(other.to_string())),
        }
    }
}
