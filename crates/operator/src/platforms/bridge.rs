//! [`PageDriver`] for the live tab, through the extension bridge.
//!
//! Every call evaluates one short script. The script prelude keeps a
//! page-side registry of element ids (weak references, so the page can drop
//! elements freely); a call on an id whose element is gone throws
//! `detached:<id>`.

use super::{DomEvent, Key, NodeId, OverlaySpec, PageDriver};
use crate::extension_bridge::ExtensionBridge;
use crate::AutomationError;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

const DEFAULT_EVAL_TIMEOUT: Duration = Duration::from_secs(10);

const PRELUDE: &str = r#"
const w = window;
if (!w.__operator) {
  let next = 1;
  const ids = new WeakMap();
  const refs = new Map();
  const idOf = (el) => {
    let id = ids.get(el);
    if (!id) { id = next++; ids.set(el, id); refs.set(id, new WeakRef(el)); }
    return id;
  };
  const node = (id) => {
    const ref = refs.get(id);
    const el = ref && ref.deref();
    if (!el || !el.isConnected) { refs.delete(id); throw new Error('detached:' + id); }
    return el;
  };
  const isControl = (el) => el instanceof HTMLInputElement || el instanceof HTMLTextAreaElement || el instanceof HTMLSelectElement;
  const caretEnd = (el) => {
    if (isControl(el) && typeof el.setSelectionRange === 'function') {
      const n = el.value.length; el.setSelectionRange(n, n); return;
    }
    const range = document.createRange();
    range.selectNodeContents(el); range.collapse(false);
    const sel = window.getSelection(); sel.removeAllRanges(); sel.addRange(range);
  };
  w.__operator = {
    snapshot() {
      const all = document.documentElement.querySelectorAll('*');
      document.documentElement.setAttribute('data-op-node', String(idOf(document.documentElement)));
      document.documentElement.setAttribute('data-op-box', '1');
      for (const el of all) {
        el.setAttribute('data-op-node', String(idOf(el)));
        el.setAttribute('data-op-box', el.getClientRects().length > 0 ? '1' : '0');
      }
      const copy = document.documentElement.cloneNode(true);
      const live = document.documentElement.querySelectorAll('input,textarea');
      const dead = copy.querySelectorAll('input,textarea');
      live.forEach((el, i) => {
        const c = dead[i];
        if (!c) return;
        if (el instanceof HTMLTextAreaElement) c.textContent = el.value;
        else c.setAttribute('value', el.value);
      });
      return copy.outerHTML;
    },
    click(id) { const el = node(id); el.scrollIntoView({ block: 'center' }); el.focus && el.focus(); el.click(); return null; },
    focus(id) { node(id).focus(); return null; },
    setNative(id, v) {
      const el = node(id);
      if (!isControl(el)) throw new Error('invalid: element is not a form control');
      const proto = Object.getPrototypeOf(el);
      const desc = Object.getOwnPropertyDescriptor(proto, 'value');
      if (!desc || !desc.set) throw new Error('invalid: no native value setter');
      desc.set.call(el, v);
      return null;
    },
    setEditable(id, text) { const el = node(id); el.focus(); el.textContent = text; return null; },
    insertAtCaret(id, text) {
      const el = node(id);
      el.focus();
      if (isControl(el) && typeof el.setRangeText === 'function') {
        el.setRangeText(text, el.selectionStart ?? el.value.length, el.selectionEnd ?? el.value.length, 'end');
      } else if (!document.execCommand('insertText', false, text)) {
        el.textContent += text; caretEnd(el);
      }
      return null;
    },
    caretEnd(id) { caretEnd(node(id)); return null; },
    read(id) { const el = node(id); return isControl(el) ? el.value : el.innerText; },
    dispatch(id, name) { node(id).dispatchEvent(new Event(name, { bubbles: true })); return null; },
    key(id, key, code) {
      const el = node(id);
      for (const type of ['keydown', 'keypress', 'keyup']) {
        el.dispatchEvent(new KeyboardEvent(type, { key, code: key, keyCode: code, which: code, bubbles: true, cancelable: true }));
      }
      return null;
    },
    windowValue(path) {
      const v = path.split('.').reduce((o, k) => (o == null ? undefined : o[k]), window);
      if (v === undefined || typeof v === 'function') return null;
      try { return JSON.parse(JSON.stringify(v)); } catch (e) { return String(v); }
    },
    mountOverlay(spec) {
      const div = document.createElement('div');
      div.id = spec.element_id;
      div.className = 'operator-overlay' + (spec.dark ? ' dark' : '');
      const h = document.createElement('h2');
      h.textContent = spec.title;
      div.appendChild(h);
      document.body.appendChild(div);
      return idOf(div);
    },
    remove(id) { node(id).remove(); return null; },
  };
}
"#;

/// Live tab driven through [`ExtensionBridge`].
pub struct BridgePage {
    bridge: Arc<ExtensionBridge>,
    timeout: Duration,
}

impl BridgePage {
    pub fn new(bridge: Arc<ExtensionBridge>) -> Self {
        Self {
            bridge,
            timeout: DEFAULT_EVAL_TIMEOUT,
        }
    }

    /// Page behind the process-wide bridge.
    pub async fn connect() -> Result<Self, AutomationError> {
        Ok(Self::new(ExtensionBridge::global().await?))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn bridge(&self) -> &Arc<ExtensionBridge> {
        &self.bridge
    }

    async fn call(&self, expr: &str) -> Result<Value, AutomationError> {
        trace!(expr, "bridge call");
        self.bridge
            .eval_in_active_tab(&script(expr), self.timeout)
            .await
            .map_err(classify_error)
    }

    async fn call_unit(&self, expr: &str) -> Result<(), AutomationError> {
        self.call(expr).await.map(|_| ())
    }

    async fn call_string(&self, expr: &str) -> Result<String, AutomationError> {
        match self.call(expr).await? {
            Value::String(s) => Ok(s),
            Value::Null => Ok(String::new()),
            other => Ok(other.to_string()),
        }
    }
}

fn script(expr: &str) -> String {
    format!("(() => {{{PRELUDE}\nreturn w.__operator.{expr};\n}})()")
}

fn js(value: &str) -> String {
    Value::String(value.to_string()).to_string()
}

/// Maps page-side failures onto the error taxonomy.
fn classify_error(e: AutomationError) -> AutomationError {
    match e {
        AutomationError::Bridge(msg) => {
            if let Some(pos) = msg.find("detached:") {
                AutomationError::ElementDetached(format!("node #{}", &msg[pos + 9..].trim()))
            } else if let Some(pos) = msg.find("invalid:") {
                AutomationError::InvalidArgument(msg[pos + 8..].trim().to_string())
            } else {
                AutomationError::Bridge(msg)
            }
        }
        other => other,
    }
}

#[async_trait::async_trait]
impl PageDriver for BridgePage {
    async fn url(&self) -> Result<String, AutomationError> {
        self.bridge
            .eval_in_active_tab("window.location.href", self.timeout)
            .await
            .map(|v| v.as_str().unwrap_or_default().to_string())
    }

    async fn snapshot(&self) -> Result<String, AutomationError> {
        self.call_string("snapshot()").await
    }

    async fn click(&self, node: NodeId) -> Result<(), AutomationError> {
        self.call_unit(&format!("click({})", node.0)).await
    }

    async fn focus(&self, node: NodeId) -> Result<(), AutomationError> {
        self.call_unit(&format!("focus({})", node.0)).await
    }

    async fn set_native_value(&self, node: NodeId, value: &str) -> Result<(), AutomationError> {
        self.call_unit(&format!("setNative({}, {})", node.0, js(value))).await
    }

    async fn set_editable_text(&self, node: NodeId, text: &str) -> Result<(), AutomationError> {
        self.call_unit(&format!("setEditable({}, {})", node.0, js(text))).await
    }

    async fn insert_at_caret(&self, node: NodeId, text: &str) -> Result<(), AutomationError> {
        self.call_unit(&format!("insertAtCaret({}, {})", node.0, js(text))).await
    }

    async fn move_caret_to_end(&self, node: NodeId) -> Result<(), AutomationError> {
        self.call_unit(&format!("caretEnd({})", node.0)).await
    }

    async fn read_value(&self, node: NodeId) -> Result<String, AutomationError> {
        self.call_string(&format!("read({})", node.0)).await
    }

    async fn dispatch(&self, node: NodeId, event: DomEvent) -> Result<(), AutomationError> {
        self.call_unit(&format!("dispatch({}, {})", node.0, js(event.name())))
            .await
    }

    async fn press_key(&self, node: NodeId, key: Key) -> Result<(), AutomationError> {
        self.call_unit(&format!(
            "key({}, {}, {})",
            node.0,
            js(key.name()),
            key.key_code()
        ))
        .await
    }

    async fn window_value(&self, path: &str) -> Result<Option<Value>, AutomationError> {
        let value = self.call(&format!("windowValue({})", js(path))).await?;
        Ok((!value.is_null()).then_some(value))
    }

    async fn mount_overlay(&self, spec: &OverlaySpec) -> Result<NodeId, AutomationError> {
        let spec_json = serde_json::to_string(spec)?;
        let id = self.call(&format!("mountOverlay({spec_json})")).await?;
        id.as_u64().map(NodeId).ok_or_else(|| {
            AutomationError::Bridge(format!("overlay mount returned {id} instead of a node id"))
        })
    }

    async fn remove_node(&self, node: NodeId) -> Result<(), AutomationError> {
        self.call_unit(&format!("remove({})", node.0)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_errors_are_classified() {
        let detached = classify_error(AutomationError::Bridge("Error: detached:42".into()));
        assert!(matches!(detached, AutomationError::ElementDetached(ref m) if m == "node #42"));

        let invalid = classify_error(AutomationError::Bridge(
            "Uncaught Error: invalid: element is not a form control".into(),
        ));
        assert!(matches!(invalid, AutomationError::InvalidArgument(_)));

        let other = classify_error(AutomationError::Timeout("slow".into()));
        assert!(matches!(other, AutomationError::Timeout(_)));
    }

    #[test]
    fn test_script_arguments_are_json_quoted() {
        assert_eq!(js("a \"b\"\nc"), r#""a \"b\"\nc""#);
        let s = script("read(3)");
        assert!(s.starts_with("(() => {"));
        assert!(s.contains("return w.__operator.read(3);"));
    }
}
