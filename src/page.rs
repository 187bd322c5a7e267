//! In-memory model of the watched messaging page.
//!
//! The page is an ordered list of nodes: anchors parsed from the HTML and
//! action controls injected after them. Anchors are reference-counted so the
//! scanner can track them by identity without owning them.

use scraper::{Html, Selector};
use std::path::PathBuf;
use std::rc::Rc;
use std::time::SystemTime;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::constants::constants;
use crate::scanner::ActionControl;

/// A link found on the page.
#[derive(Debug, PartialEq, Eq)]
pub struct Anchor {
  pub href: String,
  pub text: String,
}

#[derive(Debug)]
pub enum Node {
  Anchor(Rc<Anchor>),
  Control(ActionControl),
}

/// Emitted whenever a sync adds nodes to the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
  pub added_nodes: usize,
}

#[derive(Default)]
pub struct Page {
  nodes: Vec<Node>,
  observer: Option<mpsc::UnboundedSender<Mutation>>,
}

/// Every `a[href]` in document order.
pub fn parse_anchors(html: &str) -> Vec<Anchor> {
  let document = Html::parse_document(html);
  let Ok(selector) = Selector::parse("a[href]") else {
    return Vec::new();
  };
  document
    .select(&selector)
    .filter_map(|el| {
      let href = el.value().attr("href")?.to_string();
      let text = el.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ");
      Some(Anchor { href, text })
    })
    .collect()
}

impl Page {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register the channel that receives a [`Mutation`] for every sync that adds nodes.
  pub fn observe(&mut self) -> mpsc::UnboundedReceiver<Mutation> {
    let (tx, rx) = mpsc::unbounded_channel();
    self.observer = Some(tx);
    rx
  }

  pub fn nodes(&self) -> &[Node] {
    &self.nodes
  }

  pub fn anchors(&self) -> impl Iterator<Item = &Rc<Anchor>> {
    self.nodes.iter().filter_map(|n| match n {
      Node::Anchor(a) => Some(a),
      Node::Control(_) => None,
    })
  }

  pub fn controls(&self) -> impl Iterator<Item = &ActionControl> {
    self.nodes.iter().filter_map(|n| match n {
      Node::Control(c) => Some(c),
      Node::Anchor(_) => None,
    })
  }

  pub fn controls_mut(&mut self) -> impl Iterator<Item = &mut ActionControl> {
    self.nodes.iter_mut().filter_map(|n| match n {
      Node::Control(c) => Some(c),
      Node::Anchor(_) => None,
    })
  }

  pub fn control_mut(&mut self, index: usize) -> Option<&mut ActionControl> {
    self.controls_mut().nth(index)
  }

  /// Look up a control by its id; `None` once the page has dropped it.
  pub fn control_by_id_mut(&mut self, id: u64) -> Option<&mut ActionControl> {
    self.controls_mut().find(|c| c.id == id)
  }

  /// Insert `control` as the next sibling of `anchor`. Returns false if the anchor is gone.
  pub fn insert_after(&mut self, anchor: &Rc<Anchor>, control: ActionControl) -> bool {
    let Some(pos) = self.nodes.iter().position(|n| matches!(n, Node::Anchor(a) if Rc::ptr_eq(a, anchor))) else {
      return false;
    };
    self.nodes.insert(pos + 1, Node::Control(control));
    true
  }

  /// Bring the page in line with a new snapshot of its HTML.
  ///
  /// Anchors whose href matches the anchor at the same position in the new
  /// snapshot keep their identity along with the controls after them. From the
  /// first mismatch on, old anchors are dropped and the remaining snapshot
  /// anchors become new nodes.
  pub fn sync_html(&mut self, html: &str) {
    let fresh = parse_anchors(html);
    let mut kept = 0;
    let mut cut = self.nodes.len();
    let mut anchor_idx = 0;
    for (i, node) in self.nodes.iter().enumerate() {
      if let Node::Anchor(a) = node {
        match fresh.get(anchor_idx) {
          Some(f) if f.href == a.href => {
            kept += 1;
            anchor_idx += 1;
          }
          _ => {
            cut = i;
            break;
          }
        }
      }
    }
    self.nodes.truncate(cut);

    let added: Vec<Node> = fresh.into_iter().skip(kept).map(|a| Node::Anchor(Rc::new(a))).collect();
    let added_nodes = added.len();
    self.nodes.extend(added);

    if added_nodes > 0 {
      debug!(added_nodes, kept, "page: nodes added");
      let closed = self.observer.as_ref().is_some_and(|o| o.send(Mutation { added_nodes }).is_err());
      if closed {
        self.observer = None;
      }
    }
  }
}

/// Poll `path` and send its contents whenever the modification time changes.
/// The first read is sent immediately. Ends when the receiver is dropped.
pub async fn watch_page(path: PathBuf, tx: mpsc::Sender<String>) {
  let mut last_modified: Option<SystemTime> = None;
  let mut interval = tokio::time::interval(constants().page_poll());
  let mut reported_missing = false;
  loop {
    interval.tick().await;
    let modified = match tokio::fs::metadata(&path).await.and_then(|m| m.modified()) {
      Ok(modified) => modified,
      Err(e) => {
        if !reported_missing {
          warn!(path = %path.display(), err = %e, "page: cannot stat page file");
          reported_missing = true;
        }
        continue;
      }
    };
    reported_missing = false;
    if last_modified == Some(modified) {
      continue;
    }
    match tokio::fs::read_to_string(&path).await {
      Ok(html) => {
        last_modified = Some(modified);
        if tx.send(html).await.is_err() {
          break;
        }
      }
      Err(e) => warn!(path = %path.display(), err = %e, "page: failed to read page file"),
    }
  }
}
