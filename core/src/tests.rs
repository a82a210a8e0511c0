use alloc::{format, rc::Rc, string::String, vec::Vec};
use core::cell::{Cell, RefCell};

use proptest::prelude::*;

use crate::{
    Boundary, Cleanup, Component, Context, Descriptor, Error, Event, MemNodeId, MemoryHost,
    Mutation, NodeRef, Promise, Props, Render, RenderError, Root, Scope, Setter, Str, UpdateMode, element,
    error_boundary, fragment, start_transition, suspense, text,
};

fn markup(root: &Root<MemoryHost>) -> String {
    root.with_host(|host| host.inner_markup(root.container()))
}

fn mutations(root: &Root<MemoryHost>) -> Vec<Mutation> {
    root.with_host_mut(MemoryHost::take_mutations)
}

fn first_tag(root: &Root<MemoryHost>, tag: &str) -> MemNodeId {
    root.with_host(|host| host.find_by_tag(root.container(), tag)[0])
}

const fn leaf() -> [Descriptor; 0] {
    []
}

fn row(key: &str) -> Descriptor {
    element("li", Props::new(), [text(String::from(key))]).keyed(String::from(key))
}

fn list(keys: &[&str]) -> Descriptor {
    element("ul", Props::new(), keys.iter().map(|key| row(key)))
}

#[test]
fn rendering_the_same_tree_twice_changes_nothing() {
    let root = Root::in_memory();
    let tree = || element("div", Props::new().attr("class", "card"), [list(&["a", "b"])]);
    root.render(tree()).unwrap();
    assert_eq!(
        markup(&root),
        "<div class=\"card\"><ul><li>a</li><li>b</li></ul></div>"
    );
    mutations(&root);

    root.render(tree()).unwrap();
    assert!(mutations(&root).is_empty());
}

#[test]
fn swapping_two_keyed_rows_moves_one_node() {
    let root = Root::in_memory();
    root.render(list(&["a", "b"])).unwrap();
    mutations(&root);

    root.render(list(&["b", "a"])).unwrap();
    assert_eq!(markup(&root), "<ul><li>b</li><li>a</li></ul>");
    let log = mutations(&root);
    assert!(
        matches!(log.as_slice(), [Mutation::Insert { before: None, .. }]),
        "{log:?}"
    );
}

#[test]
fn attributes_are_diffed() {
    let root = Root::in_memory();
    root.render(element(
        "input",
        Props::new().attr("value", "a").attr("disabled", true),
        leaf(),
    ))
    .unwrap();
    mutations(&root);

    root.render(element("input", Props::new().attr("value", "b"), leaf()))
        .unwrap();
    let log = mutations(&root);
    assert_eq!(log.len(), 2, "{log:?}");
    assert!(log.iter().any(|mutation| matches!(
        mutation,
        Mutation::RemoveAttribute { name, .. } if name == "disabled"
    )));
    assert_eq!(markup(&root), "<input value=\"b\"></input>");
}

fn counter(renders: Rc<Cell<usize>>) -> Component {
    Component::new(move |scope, _, _| {
        renders.set(renders.get() + 1);
        let (count, set_count) = scope.use_state(|| 0_i64);
        let increment = scope.use_callback((), move |_: &Event| set_count.update(|count| count + 1));
        Ok(element(
            "div",
            Props::new(),
            [
                element("p", Props::new(), [text(format!("Count: {count}"))]),
                element("button", Props::new().on("onClick", increment), [text("+")]),
            ],
        ))
    })
    .named("Counter")
}

#[test]
fn clicking_a_counter_only_updates_its_text() {
    let renders = Rc::new(Cell::new(0));
    let root = Root::in_memory();
    root.render(element(counter(renders.clone()), Props::new(), leaf()))
        .unwrap();
    assert_eq!(markup(&root), "<div><p>Count: 0</p><button>+</button></div>");
    mutations(&root);

    let button = first_tag(&root, "button");
    assert!(root.dispatch_event(button, &Event::new("click")));
    rivulet_task::run_until_stalled();

    assert_eq!(markup(&root), "<div><p>Count: 1</p><button>+</button></div>");
    let log = mutations(&root);
    assert!(
        matches!(log.as_slice(), [Mutation::SetText { text, .. }] if text == "Count: 1"),
        "{log:?}"
    );
    assert_eq!(renders.get(), 2);
}

type RenderPtr = fn(&mut Scope<'_>, &Props, &[Descriptor]) -> Render;

fn starts_at_one(scope: &mut Scope<'_>, _: &Props, _: &[Descriptor]) -> Render {
    let (value, _) = scope.use_state(|| 1_i64);
    Ok(text(format!("A{value}")))
}

fn starts_at_two(scope: &mut Scope<'_>, _: &Props, _: &[Descriptor]) -> Render {
    let (value, _) = scope.use_state(|| 2_i64);
    Ok(text(format!("B{value}")))
}

#[test]
fn switching_components_remounts_with_fresh_state() {
    let first = Component::new(starts_at_one as RenderPtr);
    let second = Component::new(starts_at_two as RenderPtr);
    let root = Root::in_memory();
    root.render(element(first.clone(), Props::new(), leaf())).unwrap();
    assert_eq!(markup(&root), "A1");

    root.render(element(second, Props::new(), leaf())).unwrap();
    assert_eq!(markup(&root), "B2");

    root.render(element(first, Props::new(), leaf())).unwrap();
    assert_eq!(markup(&root), "A1");
}

#[test]
fn setter_calls_in_one_turn_render_once() {
    let renders = Rc::new(Cell::new(0));
    let root = Root::in_memory();
    root.render(element(counter(renders.clone()), Props::new(), leaf()))
        .unwrap();

    let button = first_tag(&root, "button");
    root.dispatch_event(button, &Event::new("click"));
    root.dispatch_event(button, &Event::new("click"));
    rivulet_task::run_until_stalled();

    assert_eq!(markup(&root), "<div><p>Count: 2</p><button>+</button></div>");
    assert_eq!(renders.get(), 2);
}

#[test]
fn immediate_mode_renders_inside_the_setter() {
    let renders = Rc::new(Cell::new(0));
    let root = Root::<MemoryHost>::builder()
        .update_mode(UpdateMode::Immediate)
        .build_in_memory();
    root.render(element(counter(renders.clone()), Props::new(), leaf()))
        .unwrap();

    let button = first_tag(&root, "button");
    root.dispatch_event(button, &Event::new("click"));
    assert_eq!(markup(&root), "<div><p>Count: 1</p><button>+</button></div>");
}

#[test]
fn setting_an_equal_value_does_not_render() {
    let renders = Rc::new(Cell::new(0));
    let slot: Rc<RefCell<Option<Setter<i64>>>> = Rc::default();
    let component = {
        let renders = renders.clone();
        let slot = slot.clone();
        Component::new(move |scope, _, _| {
            renders.set(renders.get() + 1);
            let (value, set_value) = scope.use_state(|| 7_i64);
            *slot.borrow_mut() = Some(set_value);
            Ok(text(format!("{value}")))
        })
    };
    let root = Root::in_memory();
    root.render(element(component, Props::new(), leaf())).unwrap();

    slot.borrow().as_ref().unwrap().set(7);
    rivulet_task::run_until_stalled();
    assert_eq!(renders.get(), 1);
}

#[test]
fn effects_follow_their_dependencies() {
    let log: Rc<RefCell<Vec<String>>> = Rc::default();
    let component = {
        let log = log.clone();
        Component::new(move |scope, props, _| {
            let value = props.get_int("value").unwrap_or_default();
            let log = log.clone();
            scope.use_effect(value, move || {
                log.borrow_mut().push(format!("run {value}"));
                Cleanup::new(move || log.borrow_mut().push(format!("cleanup {value}")))
            });
            Ok(text(format!("{value}")))
        })
    };
    let view = |value: i64| element(component.clone(), Props::new().attr("value", value), leaf());

    let root = Root::in_memory();
    root.render(view(1)).unwrap();
    root.render(view(1)).unwrap();
    assert_eq!(*log.borrow(), ["run 1"]);

    root.render(view(2)).unwrap();
    assert_eq!(*log.borrow(), ["run 1", "cleanup 1", "run 2"]);

    root.unmount();
    assert_eq!(*log.borrow(), ["run 1", "cleanup 1", "run 2", "cleanup 2"]);
    assert_eq!(markup(&root), "");
    assert_eq!(root.instance_count(), 0);
}

#[test]
fn layout_effects_run_before_passive_effects() {
    let log: Rc<RefCell<Vec<&'static str>>> = Rc::default();
    let component = {
        let log = log.clone();
        Component::new(move |scope, _, _| {
            let passive = log.clone();
            scope.use_effect((), move || passive.borrow_mut().push("passive"));
            let layout = log.clone();
            scope.use_layout_effect((), move || layout.borrow_mut().push("layout"));
            Ok(Descriptor::Empty)
        })
    };
    let root = Root::in_memory();
    root.render(element(component, Props::new(), leaf())).unwrap();
    assert_eq!(*log.borrow(), ["layout", "passive"]);
}

#[test]
fn suspense_shows_the_fallback_until_the_promise_resolves() {
    let (promise, resolver) = Promise::<Str>::new();
    let reader = Component::new(move |scope, _, _| {
        let value = scope.use_promise(&promise)?;
        Ok(element("span", Props::new(), [text(value)]))
    });
    let root = Root::in_memory();
    root.render(suspense(text("loading"), [element(reader, Props::new(), leaf())]))
        .unwrap();
    assert_eq!(markup(&root), "loading");

    resolver.resolve(Str::from("done"));
    rivulet_task::run_until_stalled();
    assert_eq!(markup(&root), "<span>done</span>");
}

fn reading(promise: Promise<Str>) -> Descriptor {
    let reader = Component::new(move |scope, _, _| Ok(text(scope.use_promise(&promise)?)));
    element(reader, Props::new(), leaf())
}

#[test]
fn suspended_siblings_commit_together() {
    let (first, resolve_first) = Promise::new();
    let (second, resolve_second) = Promise::new();
    let root = Root::in_memory();
    root.render(suspense(text("loading"), [reading(first), reading(second)]))
        .unwrap();

    resolve_second.resolve(Str::from("b"));
    rivulet_task::run_until_stalled();
    assert_eq!(markup(&root), "loading");

    resolve_first.resolve(Str::from("a"));
    rivulet_task::run_until_stalled();
    assert_eq!(markup(&root), "ab");
}

#[test]
fn late_rejections_reach_the_error_boundary_above_the_suspense() {
    let (promise, resolver) = Promise::new();
    let root = Root::in_memory();
    root.render(error_boundary(
        |error| text(format!("err: {error}")),
        [suspense(text("loading"), [reading(promise)])],
    ))
    .unwrap();
    assert_eq!(markup(&root), "loading");

    resolver.reject(RenderError::msg("offline"));
    rivulet_task::run_until_stalled();
    assert_eq!(markup(&root), "err: offline");
}

#[test]
fn deferred_children_suspend_like_components() {
    let (promise, resolver) = Promise::<Descriptor>::new();
    let root = Root::in_memory();
    root.render(suspense(
        text("…"),
        [element("b", Props::new(), [Descriptor::deferred(promise)])],
    ))
    .unwrap();
    assert_eq!(markup(&root), "…");

    resolver.resolve(text("ready"));
    rivulet_task::run_until_stalled();
    assert_eq!(markup(&root), "<b>ready</b>");
}

fn faulty() -> Component {
    Component::new(|_, props, _| {
        let index = props.get_int("index").unwrap_or_default();
        if index == 2 {
            return Err(RenderError::msg(format!("row {index} failed")).into());
        }
        Ok(element("li", Props::new(), [text(format!("{index}"))]))
    })
}

#[test]
fn an_error_only_replaces_its_own_boundary() {
    let reported = Rc::new(Cell::new(0));
    let rows = (1..=3).map(|index| {
        let reported = reported.clone();
        Boundary::error(|error| text(format!("[{error}]")))
            .on_error(move |_| reported.set(reported.get() + 1))
            .wrap([element(faulty(), Props::new().attr("index", index), leaf())])
    });
    let root = Root::in_memory();
    root.render(element("ul", Props::new(), rows)).unwrap();
    assert_eq!(
        markup(&root),
        "<ul><li>1</li>[row 2 failed]<li>3</li></ul>"
    );
    assert_eq!(reported.get(), 1);
}

#[test]
fn errors_are_reported_only_when_their_fallback_commits() {
    let reported = Rc::new(Cell::new(0));
    let (promise, resolver) = Promise::<Str>::new();
    let reader = Component::new(move |scope, _, _| Ok(text(scope.use_promise(&promise)?)));
    let guarded = {
        let reported = reported.clone();
        Boundary::error(|error| text(format!("[{error}]")))
            .on_error(move |_| reported.set(reported.get() + 1))
            .wrap([element(faulty(), Props::new().attr("index", 2), leaf())])
    };
    let root = Root::in_memory();
    root.render(suspense(
        text("loading"),
        [guarded, element(reader, Props::new(), leaf())],
    ))
    .unwrap();
    assert_eq!(markup(&root), "loading");
    assert_eq!(reported.get(), 0);

    resolver.resolve(Str::from("ok"));
    rivulet_task::run_until_stalled();
    assert_eq!(markup(&root), "[row 2 failed]ok");
    assert_eq!(reported.get(), 1);
}

#[test]
fn caught_errors_discard_partial_output() {
    let root = Root::in_memory();
    root.render(error_boundary(
        |_| text("fallback"),
        [element(
            "section",
            Props::new(),
            [
                element("p", Props::new(), [text("rendered before the error")]),
                element(faulty(), Props::new().attr("index", 2), leaf()),
            ],
        )],
    ))
    .unwrap();
    assert_eq!(markup(&root), "fallback");
    let created_sections = root.with_host(|host| {
        host.mutations()
            .iter()
            .filter(|mutation| matches!(mutation, Mutation::CreateElement { tag, .. } if tag == "section"))
            .count()
    });
    assert_eq!(created_sections, 0);
}

#[test]
fn unhandled_errors_keep_the_previous_content() {
    let root = Root::in_memory();
    root.render(element("p", Props::new(), [text("ok")])).unwrap();

    let result = root.render(element(faulty(), Props::new().attr("index", 2), leaf()));
    assert!(matches!(result, Err(Error::Unhandled(_))));
    assert_eq!(markup(&root), "<p>ok</p>");
}

#[test]
fn suspending_outside_any_boundary_is_an_error() {
    let (promise, _resolver) = Promise::<Descriptor>::new();
    let root = Root::in_memory();
    let result = root.render(Descriptor::deferred(promise));
    assert!(matches!(result, Err(Error::UnhandledSuspension)));
}

#[test]
fn suspense_boundaries_pass_errors_through() {
    let root = Root::in_memory();
    root.render(error_boundary(
        |error| text(format!("outer: {error}")),
        [suspense(
            text("loading"),
            [element(faulty(), Props::new().attr("index", 2), leaf())],
        )],
    ))
    .unwrap();
    assert_eq!(markup(&root), "outer: row 2 failed");
}

#[test]
fn context_reads_the_nearest_provider() {
    let theme = Context::new(Str::from("light"));
    let reader = {
        let theme = theme.clone();
        Component::new(move |scope, _, _| Ok(text(scope.use_context(&theme).as_str().to_owned())))
    };
    let read = || element(reader.clone(), Props::new(), leaf());
    let root = Root::in_memory();
    root.render(fragment([
        read(),
        theme.provide(Str::from("dark"), [read(), theme.provide(Str::from("dim"), [read()])]),
    ]))
    .unwrap();
    assert_eq!(markup(&root), "lightdarkdim");
}

#[test]
fn refs_follow_the_mounted_node() {
    let node_ref = NodeRef::<MemNodeId>::new();
    let root = Root::in_memory();
    root.render(element(
        "canvas",
        Props::new().with_ref(node_ref.callback()),
        leaf(),
    ))
    .unwrap();
    assert_eq!(node_ref.get(), Some(first_tag(&root, "canvas")));

    root.render(Descriptor::Empty).unwrap();
    assert_eq!(node_ref.get(), None);
}

struct Tabs {
    root: Root<MemoryHost>,
    set_tab: Rc<RefCell<Option<Setter<i64>>>>,
    resolvers: Vec<crate::Resolver<Str>>,
}

fn tabs() -> Tabs {
    let (first, first_resolver) = Promise::new();
    let (second, second_resolver) = Promise::new();
    first_resolver.resolve(Str::from("zero"));
    let promises = Rc::new([first, second]);

    let content = Component::new(move |scope, props, _| {
        let tab = props.get_int("tab").unwrap_or_default();
        let index = usize::try_from(tab).unwrap_or_default();
        Ok(text(scope.use_promise(&promises[index])?))
    })
    .named("TabContent");

    let set_tab: Rc<RefCell<Option<Setter<i64>>>> = Rc::default();
    let page = {
        let set_tab = set_tab.clone();
        Component::new(move |scope, _, _| {
            let (tab, setter) = scope.use_state(|| 0_i64);
            *set_tab.borrow_mut() = Some(setter);
            Ok(suspense(
                text("loading"),
                [element(content.clone(), Props::new().attr("tab", tab), leaf())],
            ))
        })
        .named("Page")
    };

    let root = Root::in_memory();
    root.render(element(page, Props::new(), leaf())).unwrap();
    assert_eq!(markup(&root), "zero");
    Tabs {
        root,
        set_tab,
        resolvers: alloc::vec![first_resolver, second_resolver],
    }
}

impl Tabs {
    fn set(&self, tab: i64) {
        let setter = self.set_tab.borrow().clone();
        if let Some(setter) = setter {
            setter.set(tab);
        }
    }
}

#[test]
fn plain_updates_that_suspend_show_the_fallback() {
    let tabs = tabs();
    tabs.set(1);
    rivulet_task::run_until_stalled();
    assert_eq!(markup(&tabs.root), "loading");

    tabs.resolvers[1].resolve(Str::from("one"));
    rivulet_task::run_until_stalled();
    assert_eq!(markup(&tabs.root), "one");
}

#[test]
fn transitions_keep_committed_content_while_suspended() {
    let tabs = tabs();
    let transition = start_transition(|| tabs.set(1));
    rivulet_task::run_until_stalled();
    assert_eq!(markup(&tabs.root), "zero");
    assert!(!transition.is_finished());

    tabs.resolvers[1].resolve(Str::from("one"));
    rivulet_task::run_until_stalled();
    assert_eq!(markup(&tabs.root), "one");
    assert_eq!(rivulet_task::block_on(transition), Some(()));
    assert_eq!(tabs.root.with_host(MemoryHost::view_transitions), 1);
}

#[test]
fn newer_updates_supersede_a_waiting_transition() {
    let tabs = tabs();
    let transition = start_transition(|| tabs.set(1));
    rivulet_task::run_until_stalled();
    assert!(!transition.is_finished());

    tabs.set(0);
    rivulet_task::run_until_stalled();
    assert_eq!(rivulet_task::block_on(transition), None);
    assert_eq!(markup(&tabs.root), "zero");
}

#[test]
fn use_id_is_stable_across_renders() {
    let ids: Rc<RefCell<Vec<Str>>> = Rc::default();
    let component = {
        let ids = ids.clone();
        Component::new(move |scope, _, _| {
            ids.borrow_mut().push(scope.use_id());
            Ok(Descriptor::Empty)
        })
    };
    let root = Root::in_memory();
    root.render(element(component.clone(), Props::new(), leaf())).unwrap();
    root.render(element(component, Props::new(), leaf())).unwrap();
    let ids = ids.borrow();
    assert_eq!(ids.len(), 2);
    assert_eq!(ids[0], ids[1]);
}

proptest! {
    #[test]
    fn keyed_permutations_reuse_every_row(order in Just((0..6).collect::<Vec<usize>>()).prop_shuffle()) {
        let keys: Vec<String> = (0..6).map(|index| format!("k{index}")).collect();
        let initial: Vec<&str> = keys.iter().map(String::as_str).collect();
        let shuffled: Vec<&str> = order.iter().map(|&index| keys[index].as_str()).collect();

        let root = Root::in_memory();
        root.render(list(&initial)).unwrap();
        mutations(&root);
        root.render(list(&shuffled)).unwrap();

        let expected: String = shuffled.iter().map(|key| format!("<li>{key}</li>")).collect();
        prop_assert_eq!(markup(&root), format!("<ul>{expected}</ul>"));
        let log = mutations(&root);
        let only_inserts = log.iter().all(|mutation| matches!(mutation, Mutation::Insert { .. }));
        prop_assert!(only_inserts);
        prop_assert!(log.len() < keys.len());
    }
}
