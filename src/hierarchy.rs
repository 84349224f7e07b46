//! Folder tree assembly.
//!
//! Turns the flat category list and the flat task list (each task with its
//! category links) into a forest of folders. Assembly never fails: a
//! reference to a category that is not in the batch drops the referencing
//! folder or task view from the forest. Every drop is recorded in an
//! [`AssemblyReport`] so callers can inspect what went missing.
//!
//! The derived structures borrow from the input rows and are rebuilt from
//! scratch on every reload.

use crate::types::{CategoryNode, Task, TaskLinks};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// A task as it appears inside one folder.
///
/// Completion belongs to the (task, category) pair, so the same task can be
/// complete in one folder and open in another.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskView<'a> {
    pub task: &'a Task,
    pub category_id: &'a str,
    pub completed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FolderNode<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub children: Vec<FolderNode<'a>>,
    pub tasks: Vec<TaskView<'a>>,
}

impl<'a> FolderNode<'a> {
    /// Depth-first walk over this folder and its descendants, parents first.
    pub fn walk(&self) -> Vec<&FolderNode<'a>> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(node.children.iter().rev());
        }
        out
    }
}

/// The assembled tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Forest<'a> {
    pub roots: Vec<FolderNode<'a>>,
    /// Tasks with no category link at all, in input order.
    pub unassigned: Vec<&'a Task>,
}

impl<'a> Forest<'a> {
    /// Every folder in the forest, parents before children.
    pub fn folders(&self) -> Vec<&FolderNode<'a>> {
        self.roots.iter().flat_map(|r| r.walk()).collect()
    }

    pub fn find(&self, id: &str) -> Option<&FolderNode<'a>> {
        self.folders().into_iter().find(|f| f.id == id)
    }
}

/// Why a category or link is absent from the forest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum DropReason {
    /// The category's parent is not in the batch.
    MissingParent { parent_id: String },
    /// Some ancestor of the category was dropped.
    AncestorDropped,
    /// The category's parent chain loops back to itself.
    Cycle,
    /// An earlier category in the batch has the same id.
    DuplicateId,
    /// The link points at a category that is not in the batch.
    UnknownCategory,
    /// The link's category exists but is not part of the forest.
    CategoryDropped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "placement", rename_all = "snake_case")]
pub enum Placement {
    Kept,
    Dropped { reason: DropReason },
}

impl Placement {
    fn dropped(reason: DropReason) -> Self {
        Placement::Dropped { reason }
    }

    pub fn is_kept(&self) -> bool {
        matches!(self, Placement::Kept)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryOutcome<'a> {
    pub category_id: &'a str,
    pub placement: Placement,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkOutcome<'a> {
    pub task_id: &'a str,
    pub category_id: &'a str,
    pub placement: Placement,
}

/// Per-input outcome of one assembly, in input order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AssemblyReport<'a> {
    pub categories: Vec<CategoryOutcome<'a>>,
    pub links: Vec<LinkOutcome<'a>>,
}

impl<'a> AssemblyReport<'a> {
    pub fn dropped_categories(&self) -> impl Iterator<Item = &CategoryOutcome<'a>> {
        self.categories.iter().filter(|c| !c.placement.is_kept())
    }

    pub fn dropped_links(&self) -> impl Iterator<Item = &LinkOutcome<'a>> {
        self.links.iter().filter(|l| !l.placement.is_kept())
    }

    pub fn category(&self, id: &str) -> Option<&Placement> {
        self.categories
            .iter()
            .find(|c| c.category_id == id)
            .map(|c| &c.placement)
    }
}

/// Build the folder forest.
pub fn assemble<'a>(categories: &'a [CategoryNode], tasks: &'a [TaskLinks]) -> Forest<'a> {
    assemble_with_report(categories, tasks).0
}

/// Build the folder forest and report what was dropped.
pub fn assemble_with_report<'a>(
    categories: &'a [CategoryNode],
    tasks: &'a [TaskLinks],
) -> (Forest<'a>, AssemblyReport<'a>) {
    let n = categories.len();

    // Lookup from id to input index. The first category with a given id wins.
    let mut index: HashMap<&'a str, usize> = HashMap::with_capacity(n);
    let mut placement: Vec<Option<Placement>> = vec![None; n];
    for (i, c) in categories.iter().enumerate() {
        if index.contains_key(c.id.as_str()) {
            placement[i] = Some(Placement::dropped(DropReason::DuplicateId));
        } else {
            index.insert(c.id.as_str(), i);
        }
    }

    // Attach each category under its parent, visiting in position order.
    let mut order: Vec<usize> = (0..n).filter(|&i| placement[i].is_none()).collect();
    order.sort_by_key(|&i| categories[i].position);

    let mut roots: Vec<usize> = Vec::new();
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); n];
    for &i in &order {
        match categories[i].parent_id.as_deref() {
            None => roots.push(i),
            Some(parent) => match index.get(parent) {
                Some(&p) => children[p].push(i),
                None => {
                    placement[i] = Some(Placement::dropped(DropReason::MissingParent {
                        parent_id: parent.to_string(),
                    }));
                }
            },
        }
    }

    // Distribute task views into their folders.
    let mut views: Vec<Vec<TaskView<'a>>> = vec![Vec::new(); n];
    let mut unassigned: Vec<&'a Task> = Vec::new();
    let mut links: Vec<(LinkOutcome<'a>, Option<usize>)> = Vec::new();
    for TaskLinks { task, links: task_links } in tasks {
        if task_links.is_empty() {
            unassigned.push(task);
            continue;
        }
        for link in task_links {
            let slot = index.get(link.category_id.as_str()).copied();
            if let Some(i) = slot {
                views[i].push(TaskView {
                    task,
                    category_id: link.category_id.as_str(),
                    completed: link.completed,
                });
            }
            links.push((
                LinkOutcome {
                    task_id: task.id.as_str(),
                    category_id: link.category_id.as_str(),
                    placement: match slot {
                        Some(_) => Placement::Kept,
                        None => Placement::dropped(DropReason::UnknownCategory),
                    },
                },
                slot,
            ));
        }
    }

    // Materialize from the roots down. Each category sits in at most one
    // child list, so the reachable part is acyclic and every node is built once.
    let mut kept = vec![false; n];
    let mut preorder: Vec<usize> = Vec::with_capacity(n);
    let mut stack: Vec<usize> = roots.clone();
    while let Some(i) = stack.pop() {
        if kept[i] {
            continue;
        }
        kept[i] = true;
        preorder.push(i);
        stack.extend(children[i].iter().copied());
    }

    let mut built: Vec<Option<FolderNode<'a>>> = vec![None; n];
    for &i in preorder.iter().rev() {
        let kids = children[i]
            .iter()
            .filter_map(|&c| built[c].take())
            .collect();
        built[i] = Some(FolderNode {
            id: categories[i].id.as_str(),
            name: categories[i].name.as_str(),
            children: kids,
            tasks: std::mem::take(&mut views[i]),
        });
    }
    let roots: Vec<FolderNode<'a>> = roots.iter().filter_map(|&r| built[r].take()).collect();

    // Classify everything that did not make it into the forest.
    let report_categories = categories
        .iter()
        .enumerate()
        .map(|(i, c)| CategoryOutcome {
            category_id: c.id.as_str(),
            placement: if kept[i] {
                Placement::Kept
            } else {
                placement[i]
                    .take()
                    .unwrap_or_else(|| classify_detached(categories, &index, i))
            },
        })
        .collect::<Vec<_>>();

    let report_links = links
        .into_iter()
        .map(|(mut outcome, slot)| {
            if let Some(i) = slot
                && !kept[i]
            {
                outcome.placement = Placement::dropped(DropReason::CategoryDropped);
            }
            outcome
        })
        .collect::<Vec<_>>();

    let report = AssemblyReport {
        categories: report_categories,
        links: report_links,
    };

    let dropped = report.dropped_categories().count();
    let dropped_links = report.dropped_links().count();
    if dropped > 0 || dropped_links > 0 {
        debug!(
            categories = n,
            dropped,
            dropped_links,
            "Folder tree assembled with drops"
        );
    }

    (Forest { roots, unassigned }, report)
}

/// Reason for a category whose own parent exists but that is still unreachable
/// from any root: either it sits on a cycle or something above it was dropped.
fn classify_detached(
    categories: &[CategoryNode],
    index: &HashMap<&str, usize>,
    start: usize,
) -> Placement {
    let mut seen: HashSet<usize> = HashSet::new();
    seen.insert(start);
    let mut current = start;
    loop {
        let Some(parent) = categories[current].parent_id.as_deref() else {
            // A root is always kept, so an ancestor without a parent means the
            // walk left the batch through a dropped duplicate.
            return Placement::dropped(DropReason::AncestorDropped);
        };
        let Some(&p) = index.get(parent) else {
            return Placement::dropped(DropReason::AncestorDropped);
        };
        if p == start {
            return Placement::dropped(DropReason::Cycle);
        }
        if !seen.insert(p) {
            // Looped, but not through `start`.
            return Placement::dropped(DropReason::AncestorDropped);
        }
        current = p;
    }
}
