use triage::errors::ListError;
use triage::gmail::GmailRecord;
use triage::list::{build_groups, Entry, ListModel, RowKind};
use triage::types::Message;

fn message(id: &str, sender: &str, subject: &str) -> Message {
    let record = GmailRecord::new(id)
        .with_header("From", sender)
        .with_header("Subject", subject);
    Message::from_record(&record)
}

fn inbox() -> Vec<Message> {
    vec![
        message("1", "bob", "lunch?"),
        message("2", "amy", "report"),
        message("3", "bob", "re: lunch?"),
    ]
}

fn group_at(model: &ListModel, offset: usize) -> triage::list::GroupId {
    match model.resolve(offset).unwrap() {
        Entry::Group(id) => id,
        other => panic!("expected group at {offset}, got {other:?}"),
    }
}

fn item_at(model: &ListModel, offset: usize) -> triage::list::ItemId {
    match model.resolve(offset).unwrap() {
        Entry::Item(id) => id,
        other => panic!("expected item at {offset}, got {other:?}"),
    }
}

#[test]
fn rebuild_sorts_by_sender_and_keeps_discovery_order() {
    let model = ListModel::from_messages(inbox());
    let groups = model.groups();

    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0].sender, "amy");
    assert_eq!(groups[1].sender, "bob");
    let bob_ids: Vec<&str> = groups[1].items.iter().map(|i| i.message.id.as_str()).collect();
    assert_eq!(bob_ids, vec!["1", "3"]);
    assert!(groups.iter().all(|g| g.collapsed));
    assert_eq!(model.visible_len(), 2);
}

#[test]
fn rebuild_resets_collapse_and_selection() {
    let mut model = ListModel::from_messages(inbox());
    let amy = group_at(&model, 0);
    model.toggle_group(amy).unwrap();
    let bob = group_at(&model, 1);
    model.toggle_collapse(bob).unwrap();
    assert_eq!(model.selected_count(), 1);

    model.rebuild(inbox());

    assert_eq!(model.groups()[0].sender, "amy");
    assert!(model.groups().iter().all(|g| g.collapsed));
    assert_eq!(model.selected_count(), 0);
}

#[test]
fn grouping_is_exact_and_case_sensitive() {
    let groups = build_groups(vec![
        message("1", "Bob <bob@x.io>", "a"),
        message("2", "bob <bob@x.io>", "b"),
        message("3", "Bob <bob@x.io>", "c"),
    ]);
    let senders: Vec<&str> = groups.iter().map(|g| g.sender.as_str()).collect();
    assert_eq!(senders, vec!["Bob <bob@x.io>", "bob <bob@x.io>"]);
    assert_eq!(groups[0].items.len(), 2);
}

#[test]
fn resolve_skips_items_of_collapsed_groups() {
    let mut model = ListModel::from_messages(inbox());
    let amy = group_at(&model, 0);
    model.toggle_collapse(amy).unwrap();

    // amy(0) report(1) bob(2)
    assert_eq!(model.visible_len(), 3);
    let report = item_at(&model, 1);
    assert_eq!(model.item(report).unwrap().message.id, "2");
    assert_eq!(report.group(), amy);
    let bob = group_at(&model, 2);
    assert_eq!(model.group(bob).unwrap().sender, "bob");

    model.toggle_collapse(bob).unwrap();
    let ids: Vec<String> = (3..5)
        .map(|offset| model.item(item_at(&model, offset)).unwrap().message.id.clone())
        .collect();
    assert_eq!(ids, vec!["1", "3"]);
}

#[test]
fn resolve_reports_out_of_range() {
    let model = ListModel::from_messages(inbox());
    assert_eq!(
        model.resolve(2),
        Err(ListError::OutOfRange {
            offset: 2,
            visible: 2
        })
    );

    let empty = ListModel::new();
    assert_eq!(
        empty.resolve(0),
        Err(ListError::OutOfRange {
            offset: 0,
            visible: 0
        })
    );
}

#[test]
fn toggle_group_selects_all_unless_all_selected() {
    let mut model = ListModel::from_messages(inbox());
    let bob = group_at(&model, 1);
    model.toggle_collapse(bob).unwrap();
    model.toggle_item(item_at(&model, 2)).unwrap();
    assert_eq!(model.selected_count(), 1);

    model.toggle_group(bob).unwrap();
    assert!(model.group(bob).unwrap().items.iter().all(|i| i.checked));

    model.toggle_group(bob).unwrap();
    assert!(model.group(bob).unwrap().items.iter().all(|i| !i.checked));
}

#[test]
fn collapsing_keeps_checked_items() {
    let mut model = ListModel::from_messages(inbox());
    let bob = group_at(&model, 1);
    model.toggle_collapse(bob).unwrap();
    model.toggle_item(item_at(&model, 3)).unwrap();

    model.toggle_collapse(bob).unwrap();
    assert_eq!(model.visible_len(), 2);
    let selected: Vec<&str> = model.selected_messages().iter().map(|m| m.id.as_str()).collect();
    assert_eq!(selected, vec!["3"]);

    model.toggle_collapse(bob).unwrap();
    let checks: Vec<bool> = model.group(bob).unwrap().items.iter().map(|i| i.checked).collect();
    assert_eq!(checks, vec![false, true]);
}

#[test]
fn selected_messages_follow_group_then_item_order() {
    let mut model = ListModel::from_messages(inbox());
    model.toggle_check(1).unwrap();
    model.toggle_check(0).unwrap();

    let selected: Vec<&str> = model.selected_messages().iter().map(|m| m.id.as_str()).collect();
    assert_eq!(selected, vec!["2", "1", "3"]);

    model.deselect_all();
    assert!(model.selected_messages().is_empty());
}

#[test]
fn collapse_on_item_row_is_a_no_op() {
    let mut model = ListModel::from_messages(inbox());
    model.toggle_collapse_at(0).unwrap();
    assert_eq!(model.visible_len(), 3);

    model.toggle_collapse_at(1).unwrap();
    assert_eq!(model.visible_len(), 3);
}

#[test]
fn ids_from_before_a_rebuild_are_stale() {
    let mut model = ListModel::from_messages(inbox());
    let amy = group_at(&model, 0);
    model.rebuild(inbox());

    assert_eq!(model.toggle_group(amy), Err(ListError::StaleId));
    assert_eq!(model.toggle_collapse(amy), Err(ListError::StaleId));
}

#[test]
fn rows_render_labels_and_flags() {
    let mut model = ListModel::from_messages(inbox());
    model.toggle_collapse_at(1).unwrap();
    model.toggle_check(2).unwrap();

    let rows = model.rows();
    let labels: Vec<&str> = rows.iter().map(|r| r.label.as_str()).collect();
    assert_eq!(
        labels,
        vec!["+ (1) amy", "- (2) bob", "  [✓] lunch?", "  [ ] re: lunch?"]
    );
    assert_eq!(rows[1].kind, RowKind::Group { collapsed: false });
    assert_eq!(rows[2].kind, RowKind::Item { checked: true });
}

#[test]
fn group_label_counts_items_not_selection() {
    let mut model = ListModel::from_messages(inbox());
    model.toggle_check(1).unwrap();
    assert_eq!(model.groups()[1].label(), "+ (2) bob");
}
