//! Sender-grouped message list with collapsible groups and multi-select.
//!
//! Groups and items live in a flat arena addressed by [`GroupId`] and
//! [`ItemId`]. The presentation layer addresses rows by a single offset into
//! the visible rows: every group occupies one row, followed by one row per
//! item when the group is expanded. The offset of each group is a prefix sum
//! that is memoized until the next mutation.
use std::cell::OnceCell;
use std::collections::BTreeMap;

use crate::errors::ListError;
use crate::types::Message;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GroupId {
    generation: u64,
    index: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ItemId {
    generation: u64,
    group: usize,
    index: usize,
}

impl ItemId {
    pub fn group(&self) -> GroupId {
        GroupId {
            generation: self.generation,
            index: self.group,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Entry {
    Group(GroupId),
    Item(ItemId),
}

#[derive(Clone, Debug)]
pub struct Group {
    pub sender: String,
    pub collapsed: bool,
    pub items: Vec<Item>,
}

impl Group {
    pub fn label(&self) -> String {
        let prefix = if self.collapsed { '+' } else { '-' };
        format!("{} ({}) {}", prefix, self.items.len(), self.sender)
    }

    pub fn all_checked(&self) -> bool {
        self.items.iter().all(|item| item.checked)
    }
}

#[derive(Clone, Debug)]
pub struct Item {
    pub text: String,
    pub checked: bool,
    pub message: Message,
}

impl Item {
    pub fn new(message: Message) -> Self {
        Self {
            text: message.subject.clone(),
            checked: false,
            message,
        }
    }

    pub fn label(&self) -> String {
        let check = if self.checked { '✓' } else { ' ' };
        format!("  [{}] {}", check, self.text)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RowKind {
    Group { collapsed: bool },
    Item { checked: bool },
}

/// One render-ready visible row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Row {
    pub label: String,
    pub kind: RowKind,
}

/// Group messages by exact sender, sorted by sender. Items keep the order
/// the messages arrived in; every group starts collapsed and every item
/// unchecked.
pub fn build_groups<I>(messages: I) -> Vec<Group>
where
    I: IntoIterator<Item = Message>,
{
    let mut by_sender: BTreeMap<String, Vec<Item>> = BTreeMap::new();
    for message in messages {
        by_sender
            .entry(message.sender.clone())
            .or_default()
            .push(Item::new(message));
    }

    by_sender
        .into_iter()
        .map(|(sender, items)| Group {
            sender,
            collapsed: true,
            items,
        })
        .collect()
}

#[derive(Debug, Default)]
pub struct ListModel {
    groups: Vec<Group>,
    generation: u64,
    /// `offsets[g]` is the row of group `g`; the last element is the row count.
    offsets: OnceCell<Vec<usize>>,
}

impl ListModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_messages<I>(messages: I) -> Self
    where
        I: IntoIterator<Item = Message>,
    {
        let mut model = Self::new();
        model.rebuild(messages);
        model
    }

    /// Replace every group. Collapse and selection state are not carried
    /// over, and ids handed out before the rebuild become stale.
    pub fn rebuild<I>(&mut self, messages: I)
    where
        I: IntoIterator<Item = Message>,
    {
        self.groups = build_groups(messages);
        self.generation += 1;
        self.invalidate();
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn visible_len(&self) -> usize {
        self.offsets().last().copied().unwrap_or(0)
    }

    pub fn resolve(&self, offset: usize) -> Result<Entry, ListError> {
        let visible = self.visible_len();
        if offset >= visible {
            return Err(ListError::OutOfRange { offset, visible });
        }

        let offsets = self.offsets();
        let group = offsets[..self.groups.len()].partition_point(|&start| start <= offset) - 1;
        let local = offset - offsets[group];

        Ok(if local == 0 {
            Entry::Group(GroupId {
                generation: self.generation,
                index: group,
            })
        } else {
            Entry::Item(ItemId {
                generation: self.generation,
                group,
                index: local - 1,
            })
        })
    }

    pub fn group(&self, id: GroupId) -> Result<&Group, ListError> {
        self.check_generation(id.generation)?;
        self.groups.get(id.index).ok_or(ListError::StaleId)
    }

    pub fn item(&self, id: ItemId) -> Result<&Item, ListError> {
        self.check_generation(id.generation)?;
        self.groups
            .get(id.group)
            .and_then(|g| g.items.get(id.index))
            .ok_or(ListError::StaleId)
    }

    /// The message behind an item row; `None` for group rows.
    pub fn message_at(&self, offset: usize) -> Result<Option<&Message>, ListError> {
        match self.resolve(offset)? {
            Entry::Group(_) => Ok(None),
            Entry::Item(id) => self.item(id).map(|item| Some(&item.message)),
        }
    }

    pub fn toggle_item(&mut self, id: ItemId) -> Result<(), ListError> {
        self.check_generation(id.generation)?;
        let item = self
            .groups
            .get_mut(id.group)
            .and_then(|g| g.items.get_mut(id.index))
            .ok_or(ListError::StaleId)?;
        item.checked = !item.checked;
        Ok(())
    }

    /// Check every item unless all are already checked, in which case
    /// uncheck them all.
    pub fn toggle_group(&mut self, id: GroupId) -> Result<(), ListError> {
        self.check_generation(id.generation)?;
        let group = self.groups.get_mut(id.index).ok_or(ListError::StaleId)?;
        let checked = !group.all_checked();
        for item in &mut group.items {
            item.checked = checked;
        }
        Ok(())
    }

    /// Collapsing hides items from addressing but keeps their checks.
    pub fn toggle_collapse(&mut self, id: GroupId) -> Result<(), ListError> {
        self.check_generation(id.generation)?;
        let group = self.groups.get_mut(id.index).ok_or(ListError::StaleId)?;
        group.collapsed = !group.collapsed;
        self.invalidate();
        Ok(())
    }

    /// Check toggle for whatever row sits at `offset`.
    pub fn toggle_check(&mut self, offset: usize) -> Result<(), ListError> {
        match self.resolve(offset)? {
            Entry::Group(id) => self.toggle_group(id),
            Entry::Item(id) => self.toggle_item(id),
        }
    }

    /// Collapse toggle for the row at `offset`; item rows are left alone.
    pub fn toggle_collapse_at(&mut self, offset: usize) -> Result<(), ListError> {
        match self.resolve(offset)? {
            Entry::Group(id) => self.toggle_collapse(id),
            Entry::Item(_) => Ok(()),
        }
    }

    /// Checked messages across all groups, collapsed or not, in group then
    /// item order.
    pub fn selected_messages(&self) -> Vec<&Message> {
        self.groups
            .iter()
            .flat_map(|g| g.items.iter())
            .filter(|item| item.checked)
            .map(|item| &item.message)
            .collect()
    }

    pub fn selected_count(&self) -> usize {
        self.groups
            .iter()
            .flat_map(|g| g.items.iter())
            .filter(|item| item.checked)
            .count()
    }

    pub fn deselect_all(&mut self) {
        for item in self.groups.iter_mut().flat_map(|g| g.items.iter_mut()) {
            item.checked = false;
        }
    }

    pub fn rows(&self) -> Vec<Row> {
        let mut rows = Vec::with_capacity(self.visible_len());
        for group in &self.groups {
            rows.push(Row {
                label: group.label(),
                kind: RowKind::Group {
                    collapsed: group.collapsed,
                },
            });
            if group.collapsed {
                continue;
            }
            rows.extend(group.items.iter().map(|item| Row {
                label: item.label(),
                kind: RowKind::Item {
                    checked: item.checked,
                },
            }));
        }
        rows
    }

    fn offsets(&self) -> &[usize] {
        self.offsets.get_or_init(|| {
            let mut offsets = Vec::with_capacity(self.groups.len() + 1);
            let mut next = 0;
            for group in &self.groups {
                offsets.push(next);
                next += 1;
                if !group.collapsed {
                    next += group.items.len();
                }
            }
            offsets.push(next);
            offsets
        })
    }

    fn invalidate(&mut self) {
        self.offsets = OnceCell::new();
    }

    fn check_generation(&self, generation: u64) -> Result<(), ListError> {
        if generation == self.generation {
            Ok(())
        } else {
            Err(ListError::StaleId)
        }
    }
}
