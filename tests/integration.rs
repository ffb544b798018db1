use std::cell::Cell;
use std::process::Command;
use std::rc::Rc;

use pretty_assertions::assert_eq;
use regex::Regex;
use treewright::html;
use treewright::{
    mount, props, render, shallow, ComponentClass, DebugOptions, Element, Error, Function,
    FunctionComponent, PropValue, ReferenceAdapter, RenderOptions, Wrapper,
};

// ── Test Fixtures ───────────────────────────────────────────────────────────

const COMBINATORS: &str = include_str!("fixtures/combinators.html");
const TODO: &str = include_str!("fixtures/todo.html");
const NAV: &str = include_str!("fixtures/nav.html");

fn options() -> RenderOptions {
    RenderOptions::new().adapter(ReferenceAdapter::new())
}

fn mount_html(source: &str) -> Wrapper {
    mount(&html::parse(source), options()).unwrap()
}

fn count(wrapper: &Wrapper, selector: &str) -> usize {
    wrapper.find(selector).unwrap().len()
}

/// Class component with a button that bumps `count` through its instance handle.
fn counter() -> Rc<ComponentClass> {
    ComponentClass::builder("Counter")
        .initial_state(|_, _| props! { "count" => 0 })
        .render(|this| {
            let count = this
                .state_value("count")
                .and_then(PropValue::as_f64)
                .unwrap_or(0.0);
            let handle = this.handle();
            let bump = Function::named("bump", move |_| {
                let current = handle
                    .state()
                    .and_then(|s| s.get("count").and_then(PropValue::as_f64))
                    .unwrap_or(0.0);
                handle.set_state(props! { "count" => current + 1.0 })?;
                Ok(PropValue::Undefined)
            });
            Ok(Element::host("div")
                .child(Element::host("span").prop("className", "count").child(count))
                .child(Element::host("button").prop("onClick", bump).child("+"))
                .into())
        })
        .build()
}

// ── Selector Engine ─────────────────────────────────────────────────────────

#[test]
fn combinator_scenario() {
    let wrapper = mount_html(COMBINATORS);
    assert_eq!(count(&wrapper, "*"), 5);
    assert_eq!(count(&wrapper, "* + *"), 2);
    assert_eq!(count(&wrapper, "* > span"), 2);
    assert_eq!(count(&wrapper, "* ~ *"), 2);
    assert_eq!(count(&wrapper, ".top-div span"), 1);
    assert_eq!(count(&wrapper, ".top-div + .bottom-div"), 1);
}

#[test]
fn combinator_scenario_matches_on_shallow_renders() {
    let wrapper = shallow(&html::parse(COMBINATORS), options()).unwrap();
    assert_eq!(count(&wrapper, "*"), 5);
    assert_eq!(count(&wrapper, "* + *"), 2);
    assert_eq!(count(&wrapper, "* > span"), 2);
}

#[test]
fn selectors_over_a_document() {
    let wrapper = mount_html(TODO);
    assert_eq!(count(&wrapper, ".item"), 3);
    assert_eq!(count(&wrapper, "li.item.done"), 1);
    assert_eq!(count(&wrapper, "ul > li + li"), 2);
    assert_eq!(count(&wrapper, "li:first-child"), 1);
    assert_eq!(count(&wrapper, "li:last-child"), 1);
    assert_eq!(count(&wrapper, "li:not(.done)"), 2);
    assert_eq!(count(&wrapper, "#app .todo-list b"), 1);
    assert_eq!(count(&wrapper, "form input[required]"), 1);
    assert_eq!(count(&wrapper, "button[disabled]"), 1);
    assert_eq!(count(&wrapper, "[hidden]"), 1);
    assert_eq!(count(&wrapper, "[className^=\"item \"]"), 2);
    assert_eq!(count(&wrapper, "[className|=todo]"), 2);
    assert_eq!(count(&wrapper, "[className~=urgent]"), 1);
    assert_eq!(count(&wrapper, "[htmlFor$=me]"), 1);
    assert_eq!(count(&wrapper, "script"), 0);
}

#[test]
fn html_attributes_are_strings() {
    let wrapper = mount_html(TODO);
    // Attribute values parsed from markup are strings, so a numeric literal misses.
    assert_eq!(count(&wrapper, "[data-id=2]"), 0);
    assert_eq!(count(&wrapper, "[data-id=\"2\"]"), 1);
}

#[test]
fn attribute_values_match_by_type() {
    let el = Element::host("div")
        .child(Element::host("i").prop("data-foo", 2))
        .child(Element::host("i").prop("data-foo", "2"))
        .child(Element::host("i").prop("data-foo", -0.0))
        .child(Element::host("i").prop("data-foo", f64::NAN))
        .child(Element::host("i").prop("data-foo", true));
    let wrapper = mount(&el, options()).unwrap();

    let two = wrapper.find("[data-foo=2]").unwrap();
    assert_eq!(two.len(), 1);
    assert_eq!(two.prop("data-foo").unwrap(), Some(PropValue::Number(2.0)));
    assert_eq!(count(&wrapper, "[data-foo=\"2abc\"]"), 0);
    assert_eq!(count(&wrapper, "[data-foo=\"2\"]"), 1);
    assert_eq!(count(&wrapper, "[data-foo=-0]"), 1);
    assert_eq!(count(&wrapper, "[data-foo=0]"), 0);
    assert_eq!(count(&wrapper, "[data-foo=NaN]"), 1);
    assert_eq!(count(&wrapper, "[data-foo=true]"), 1);
    // -0 and NaN are falsy, so only 2, "2" and true count as present.
    assert_eq!(count(&wrapper, "[data-foo]"), 3);
}

#[test]
fn unsupported_pseudo_classes_name_the_token() {
    let wrapper = mount_html(TODO);
    let err = wrapper.find("li:nth-child(2)").unwrap_err();
    assert!(matches!(err, Error::UnsupportedSelector(_)));
    assert!(err.to_string().contains(":nth-child"));
}

#[test]
fn simple_only_methods_reject_combinators() {
    let wrapper = mount_html(TODO);
    let items = wrapper.find("li").unwrap();
    for result in [
        items.filter("ul li").map(|_| ()),
        items.not("ul > li").map(|_| ()),
        items.every("ul li").map(|_| ()),
        items.first().is("ul li").map(|_| ()),
    ] {
        match result {
            Err(Error::ComplexSelector(message)) => {
                assert_eq!(message, "This method does not support complex CSS selectors")
            }
            other => panic!("expected a complex selector error, got {other:?}"),
        }
    }
}

#[test]
fn queries_by_type_and_props() {
    let item = FunctionComponent::new("Item", |props, _| {
        Ok(Element::host("li").child(props.get("label").cloned().unwrap_or_default()).into())
    });
    let el = Element::host("ul")
        .child(Element::function(&item).prop("label", "a").key("a"))
        .child(Element::function(&item).prop("label", "b").key("b"));
    let wrapper = mount(&el, options()).unwrap();

    assert_eq!(count(&wrapper, "Item"), 2);
    let items = wrapper.find(&treewright::ElementType::Function(Rc::clone(&item))).unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items.at(1).key().unwrap().as_deref(), Some("b"));
    let b = wrapper.find(&props! { "label" => "b" }).unwrap();
    assert_eq!(b.len(), 1);
    assert_eq!(b.text().unwrap(), "b");
    assert_eq!(b.name().unwrap().as_deref(), Some("Item"));
}

// ── Wrapper ─────────────────────────────────────────────────────────────────

#[test]
fn cardinality_guard() {
    let wrapper = mount(
        &Element::host("div").child(Element::host("i")).child(Element::host("i")),
        options(),
    )
    .unwrap();
    let children = wrapper.children();
    assert_eq!(children.len(), 2);
    for err in [
        children.props().unwrap_err(),
        children.text().unwrap_err(),
        children.html().unwrap_err(),
        children.instance().unwrap_err(),
        children.simulate("click", &[]).unwrap_err(),
    ] {
        assert!(err.to_string().contains("2 found instead"), "{err}");
    }
}

#[test]
fn traversal_keeps_tree_order() {
    let wrapper = mount_html(TODO);
    let items = wrapper.find(".item").unwrap();
    let ids: Vec<String> = items.map(|w, _| {
        w.prop("data-id")
            .unwrap()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default()
    });
    assert_eq!(ids, ["1", "2", "3"]);

    let bold = wrapper.find("b").unwrap();
    assert_eq!(bold.parent().prop("data-id").unwrap(), Some(PropValue::from("2")));
    let ancestors = bold.parents().unwrap();
    assert_eq!(ancestors.len(), 3);
    assert!(ancestors.at(2).is("section").unwrap());
    assert_eq!(bold.closest(".todo-list").unwrap().len(), 1);
    assert_eq!(bold.parents_matching("#app").unwrap().len(), 1);

    // Parents de-duplicate.
    assert_eq!(items.parent().len(), 1);
    assert_eq!(wrapper.find("ul").unwrap().children().len(), 3);
    assert_eq!(wrapper.find("ul").unwrap().child_at(1).text().unwrap(), "Write report");
}

#[test]
fn filter_never_descends() {
    let wrapper = mount_html(TODO);
    let items = wrapper.find("li").unwrap();
    assert_eq!(items.filter(".urgent").unwrap().len(), 1);
    assert_eq!(items.not(".done").unwrap().len(), 2);
    assert_eq!(items.filter("b").unwrap().len(), 0);
    assert!(items.every(".item").unwrap());
    assert!(!items.every(".done").unwrap());
    assert!(items.some(".done").unwrap());
    assert_eq!(
        items
            .filter_where(|w| w.text().map(|t| t.contains("milk")).unwrap_or(false))
            .len(),
        1
    );
}

#[test]
fn find_where_sees_every_node() {
    let wrapper = mount_html(TODO);
    let with_ids = wrapper.find_where(|w| w.prop("data-id").ok().flatten().is_some());
    assert_eq!(with_ids.len(), 3);
}

#[test]
fn text_and_classes() {
    let wrapper = mount_html(NAV);
    let links = wrapper.find("a").unwrap();
    assert_eq!(links.len(), 3);
    assert_eq!(links.first().text().unwrap(), "Home");
    assert!(links.first().has_class("active").unwrap());
    let about = links.last();
    assert!(about.has_class("external-link").unwrap());
    assert!(!about.has_class("external").unwrap());
    assert!(about.has_class(Regex::new("^link ext").unwrap()).unwrap());
    assert_eq!(wrapper.find("footer p").unwrap().text().unwrap(), "© treewright & friends");
}

#[test]
fn set_props_merges_into_existing_props() {
    let echo = FunctionComponent::new("Echo", |props, _| {
        Ok(Element::host("div").with_props(props.clone()).into())
    });
    let wrapper = mount(
        &Element::function(&echo).with_props(props! { "id" => "foo", "foo" => "bar" }),
        options(),
    )
    .unwrap();

    let called = Rc::new(Cell::new(false));
    let flag = Rc::clone(&called);
    wrapper
        .set_props_then(
            props! { "id" => "bar" },
            Function::new(move |_| {
                flag.set(true);
                Ok(PropValue::Undefined)
            }),
        )
        .unwrap();

    assert!(called.get());
    assert_eq!(wrapper.props().unwrap(), props! { "id" => "bar", "foo" => "bar" });
    assert_eq!(wrapper.find("#bar").unwrap().len(), 2);
    assert_eq!(wrapper.find("div#bar").unwrap().len(), 1);
}

#[test]
fn set_props_rejects_non_function_callbacks() {
    let wrapper = mount(&Element::host("div"), options()).unwrap();
    let err = wrapper.set_props_then(props! { "id" => "x" }, 42).unwrap_err();
    assert_eq!(
        err.to_string(),
        "MountWrapper::set_props() expects a function as its second argument"
    );
}

#[test]
fn render_errors_propagate_from_updates() {
    let fragile = FunctionComponent::new("Fragile", |props, _| {
        if props.get("explode").is_some_and(PropValue::is_truthy) {
            return Err(Error::component("boom"));
        }
        Ok(Element::host("p").child("ok").into())
    });
    let wrapper = mount(&Element::function(&fragile), options()).unwrap();
    let err = wrapper.set_props(props! { "explode" => true }).unwrap_err();
    assert_eq!(err, Error::Component("boom".into()));
}

/// Class component whose render fails once `explode` is set in props or state.
/// Its button sets `explode` in state.
fn volatile(mounts: Rc<Cell<usize>>) -> Rc<ComponentClass> {
    ComponentClass::builder("Volatile")
        .render(|this| {
            let explode = |p: &treewright::Props| p.get("explode").is_some_and(PropValue::is_truthy);
            if explode(&this.props) || explode(&this.state) {
                return Err(Error::component("volatile render failed"));
            }
            let handle = this.handle();
            let arm = Function::named("arm", move |_| {
                handle.set_state(props! { "explode" => true })?;
                Ok(PropValue::Undefined)
            });
            let label = this.props.get("label").cloned().unwrap_or_default();
            Ok(Element::host("div")
                .child(Element::host("span").child(label))
                .child(Element::host("button").prop("onClick", arm))
                .into())
        })
        .component_did_mount(move |_| {
            mounts.set(mounts.get() + 1);
            Ok(())
        })
        .build()
}

#[test]
fn set_props_updates_in_place() {
    let mounts = Rc::new(Cell::new(0));
    let wrapper = mount(
        &Element::class(&volatile(Rc::clone(&mounts))).prop("label", "one"),
        options(),
    )
    .unwrap();
    let instance = wrapper.instance().unwrap().unwrap();
    let span = wrapper.find("span").unwrap().get_dom_node().unwrap();

    wrapper.set_props(props! { "label" => "two" }).unwrap();

    assert_eq!(wrapper.instance().unwrap(), Some(instance));
    assert!(wrapper.find("span").unwrap().get_dom_node().unwrap().ptr_eq(&span));
    assert_eq!(wrapper.find("span").unwrap().text().unwrap(), "two");
    assert_eq!(mounts.get(), 1);
}

#[test]
fn component_errors_surface_from_set_state() {
    let wrapper = mount(&Element::class(&volatile(Rc::default())), options()).unwrap();
    let err = wrapper.set_state(props! { "explode" => true }).unwrap_err();
    assert_eq!(err, Error::Component("volatile render failed".into()));
}

#[test]
fn component_errors_surface_from_mount_simulate() {
    let wrapper = mount(&Element::class(&volatile(Rc::default())), options()).unwrap();
    let err = wrapper.find("button").unwrap().simulate("click", &[]).unwrap_err();
    assert_eq!(err, Error::Component("volatile render failed".into()));
}

#[test]
fn component_errors_surface_from_shallow_updates() {
    let wrapper = shallow(&Element::class(&volatile(Rc::default())), options()).unwrap();
    let err = wrapper.find("button").unwrap().simulate("click", &[]).unwrap_err();
    assert_eq!(err, Error::Component("volatile render failed".into()));

    let wrapper = shallow(&Element::class(&volatile(Rc::default())), options()).unwrap();
    let err = wrapper.set_props(props! { "explode" => true }).unwrap_err();
    assert_eq!(err, Error::Component("volatile render failed".into()));
    let err = wrapper.set_state(props! { "explode" => true }).unwrap_err();
    assert_eq!(err, Error::Component("volatile render failed".into()));
}

#[test]
fn mount_simulate_updates_state() {
    let wrapper = mount(&Element::class(&counter()), options()).unwrap();
    assert_eq!(wrapper.find(".count").unwrap().text().unwrap(), "0");

    wrapper.find("button").unwrap().simulate("click", &[]).unwrap();
    wrapper.find("button").unwrap().simulate("click", &[]).unwrap();

    assert_eq!(wrapper.find(".count").unwrap().text().unwrap(), "2");
    assert_eq!(wrapper.state_of("count").unwrap(), Some(PropValue::from(2)));
}

#[test]
fn shallow_simulate_calls_the_handler() {
    let wrapper = shallow(&Element::class(&counter()), options()).unwrap();
    wrapper.find("button").unwrap().simulate("click", &[]).unwrap();
    assert_eq!(wrapper.find(".count").unwrap().text().unwrap(), "1");
    assert_eq!(wrapper.state().unwrap(), props! { "count" => 1 });
}

#[test]
fn set_state_then_runs_the_callback_after_commit() {
    let wrapper = mount(&Element::class(&counter()), options()).unwrap();
    let seen = Rc::new(Cell::new(false));
    let flag = Rc::clone(&seen);
    wrapper
        .set_state_then(
            props! { "count" => 5 },
            Function::new(move |_| {
                flag.set(true);
                Ok(PropValue::Undefined)
            }),
        )
        .unwrap();
    assert!(seen.get());
    assert_eq!(wrapper.text().unwrap(), "5+");
}

#[test]
fn unknown_events_fail() {
    let wrapper = mount(&Element::host("div"), options()).unwrap();
    let err = wrapper.simulate("teleport", &[]).unwrap_err();
    assert!(matches!(err, Error::Simulate { .. }));
    wrapper.simulate("click", &[]).unwrap();
}

#[test]
fn legacy_context_reaches_the_root() {
    let greeter = ComponentClass::builder("Greeter")
        .context_types(&["name"])
        .render(|this| {
            let name = this.context.get("name").cloned().unwrap_or_default();
            Ok(Element::host("p").child(name).into())
        })
        .build();
    let wrapper = mount(
        &Element::class(&greeter),
        options().context_value("name", "Ada"),
    )
    .unwrap();
    assert_eq!(wrapper.text().unwrap(), "Ada");
    assert_eq!(wrapper.context_of("name").unwrap(), Some(PropValue::from("Ada")));

    wrapper.set_context(props! { "name" => "Grace" }).unwrap();
    assert_eq!(wrapper.text().unwrap(), "Grace");
}

#[test]
fn dive_renders_one_more_level() {
    let inner = FunctionComponent::new("Inner", |props, _| {
        Ok(Element::host("em").child(props.get("word").cloned().unwrap_or_default()).into())
    });
    let inner_ty = Rc::clone(&inner);
    let outer = FunctionComponent::new("Outer", move |_, _| {
        Ok(Element::function(&inner_ty).prop("word", "deep").into())
    });
    let wrapper = shallow(&Element::function(&outer), options()).unwrap();
    assert_eq!(wrapper.debug(), "<Inner word=\"deep\" />");

    let dived = wrapper.dive().unwrap();
    assert_eq!(dived.debug(), "<em>\n  deep\n</em>");
    assert_eq!(dived.text().unwrap(), "deep");

    let err = dived.dive().unwrap_err();
    assert_eq!(
        err.to_string(),
        "ShallowWrapper::dive() can not be called on Host Components"
    );
}

#[test]
fn unmount_and_remount() {
    let wrapper = mount(&Element::class(&counter()), options()).unwrap();
    wrapper.set_state(props! { "count" => 3 }).unwrap();
    wrapper.unmount().unwrap();
    assert!(!wrapper.exists());
    wrapper.unmount().unwrap();

    wrapper.remount().unwrap();
    assert_eq!(wrapper.find(".count").unwrap().text().unwrap(), "0");
}

#[test]
fn contains_checks() {
    let wrapper = mount_html(NAV);
    assert!(wrapper.contains(&Element::host("a").prop("href", "/docs").prop("className", "link").child("Docs")));
    assert!(!wrapper.contains(&Element::host("a").prop("href", "/docs")));
    assert!(wrapper.contains_matching_element(&Element::host("a").prop("href", "/docs").child("Docs")));
    // Children still have to line up.
    assert!(!wrapper.contains_matching_element(&Element::host("a").prop("href", "/docs")));
    assert!(wrapper.contains_all_matching_elements(&[
        Element::host("a").child("Home"),
        Element::host("p").child("© treewright & friends"),
    ]));
    assert!(wrapper.contains_any_matching_elements(&[
        Element::host("table"),
        Element::host("a").child("About"),
    ]));
    assert!(!wrapper.contains_any_matching_elements(&[Element::host("table")]));
}

#[test]
fn html_serializes_the_mounted_output() {
    let wrapper = mount_html(COMBINATORS);
    assert_eq!(
        wrapper.html().unwrap().as_deref(),
        Some(r#"<div><div class="top-div"><span></span></div><div class="bottom-div"></div><span></span></div>"#)
    );
    let top = wrapper.find(".top-div").unwrap();
    assert_eq!(top.html().unwrap().as_deref(), Some(r#"<div class="top-div"><span></span></div>"#));
}

#[test]
fn string_render_queries_markup() {
    let static_wrapper = render(&html::parse(TODO), options()).unwrap();
    assert_eq!(static_wrapper.find("li").unwrap().len(), 3);
    assert_eq!(static_wrapper.find("li.done").unwrap().text(), "Buy milk");
    assert_eq!(static_wrapper.find("label").unwrap().attr("for").as_deref(), Some("name"));
}

#[test]
fn missing_adapter_is_a_config_error() {
    let err = mount(&Element::host("div"), RenderOptions::new()).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[test]
fn headless_adapter_refuses_mount_but_shallow_works() {
    let headless = RenderOptions::new().adapter(ReferenceAdapter::without_dom());
    let err = mount(&Element::host("div"), headless.clone()).unwrap_err();
    assert!(matches!(err, Error::Environment(_)));
    assert_eq!(shallow(&Element::host("div"), headless).unwrap().len(), 1);
}

// ── Debug ───────────────────────────────────────────────────────────────────

const COMBINATORS_DEBUG: &str = "<div>
  <div className=\"top-div\">
    <span />
  </div>
  <div className=\"bottom-div\" />
  <span />
</div>";

#[test]
fn debug_dump_is_stable() {
    let wrapper = mount_html(COMBINATORS);
    assert_eq!(wrapper.debug(), COMBINATORS_DEBUG);
    assert_eq!(wrapper.debug(), wrapper.debug());
}

#[test]
fn debug_ignore_props() {
    let wrapper = mount_html(TODO);
    let dump = wrapper.find("ul").unwrap().debug_with(&DebugOptions {
        ignore_props: true,
        verbose: false,
    });
    assert_eq!(
        dump,
        "<ul>\n  <li>\n    Buy milk\n  </li>\n  <li>\n    Write \n    <b>\n      report\n    </b>\n  </li>\n  <li>\n    Call Sam\n  </li>\n</ul>"
    );
}

#[test]
fn debug_of_several_nodes() {
    let wrapper = mount_html(NAV);
    let dump = wrapper.find("a").unwrap().slice(0, 2).debug_with(&DebugOptions {
        ignore_props: true,
        verbose: false,
    });
    assert_eq!(dump, "<a>\n  Home\n</a>\n\n\n<a>\n  Docs\n</a>");
}

// ── CLI ─────────────────────────────────────────────────────────────────────

fn cli(args: &[&str]) -> String {
    let output = Command::new(env!("CARGO_BIN_EXE_treewright"))
        .args(args)
        .env("RUST_LOG", "off")
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    String::from_utf8(output.stdout).unwrap()
}

fn fixture_file(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".html").tempfile().unwrap();
    std::io::Write::write_all(&mut file, contents.as_bytes()).unwrap();
    file
}

#[test]
fn cli_debug_matches_the_wrapper() {
    let file = fixture_file(COMBINATORS);
    let path = file.path().to_str().unwrap();
    assert_eq!(cli(&["debug", path]).trim_end(), COMBINATORS_DEBUG);
}

#[test]
fn cli_find_json() {
    let file = fixture_file(TODO);
    let path = file.path().to_str().unwrap();
    let out = cli(&["find", path, "li.item", "--format", "json"]);
    let nodes: serde_json::Value = serde_json::from_str(&out).unwrap();
    let nodes = nodes.as_array().unwrap();
    assert_eq!(nodes.len(), 3);
    assert_eq!(nodes[0]["type"], "li");
    assert_eq!(nodes[0]["node_type"], "host");
    assert_eq!(nodes[0]["props"]["data-id"], "1");
}

#[test]
fn cli_text_per_match() {
    let file = fixture_file(NAV);
    let path = file.path().to_str().unwrap();
    assert_eq!(cli(&["text", path, "a"]), "Home\nDocs\nAbout\n");
}

#[test]
fn cli_reports_bad_selectors() {
    let file = fixture_file(NAV);
    let output = Command::new(env!("CARGO_BIN_EXE_treewright"))
        .args(["find", file.path().to_str().unwrap(), "a:hover"])
        .env("RUST_LOG", "off")
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains(":hover"));
}
