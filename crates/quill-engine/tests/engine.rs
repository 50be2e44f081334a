use std::cell::Cell;
use std::rc::Rc;

use expect_test::expect;
use quill_engine::cst::{Path, print};
use quill_engine::{
    CharClass, Cx, Enhancer, Language, Matchable, build, class, literal, node, parse, parse_log, parse_tree,
    parse_tree_async, token,
};
use quill_errors::{ErrorKind, Result, TextSize};

fn punct(value: &str) -> Matchable {
    token("Punct").value(value)
}

async fn list(cx: Cx) -> Result<()> {
    cx.eat(punct("[").balanced("]")).await?;
    if cx.eat_match(node("Item").at("items[]")).await?.is_some() {
        loop {
            cx.branch().await?;
            if cx.eat_match(punct(",")).await?.is_some() && cx.eat_match(node("Item").at("items[]")).await?.is_some() {
                cx.accept().await?;
            } else {
                cx.reject().await?;
                break;
            }
        }
    }
    cx.eat(punct("]").balancer()).await?;
    Ok(())
}

async fn item(cx: Cx) -> Result<()> {
    cx.eat(token("Digits").at("value")).await?;
    Ok(())
}

async fn punctuator(cx: Cx) -> Result<()> {
    let value = cx.prop_str("value")?;
    cx.eat(literal(value)).await?;
    Ok(())
}

async fn digits(cx: Cx) -> Result<()> {
    cx.eat(class(CharClass::Digit).one_or_more()).await?;
    Ok(())
}

async fn space(cx: Cx) -> Result<()> {
    cx.eat(class(CharClass::Whitespace).one_or_more()).await?;
    Ok(())
}

async fn word(cx: Cx) -> Result<()> {
    cx.eat(class(CharClass::Alpha).one_or_more()).await?;
    Ok(())
}

/// `[1, 22, 333]`: bracketed digit lists with optional blanks.
fn language() -> Language {
    Language::builder("List")
        .root("List")
        .node("List", list)
        .node("Item", item)
        .token("Punct", punctuator)
        .token("Digits", digits)
        .token("Space", space)
        .enhance(Enhancer::trivia("Space"))
        .enhance(Enhancer::nodes())
        .build()
        .unwrap()
}

#[test]
fn parsed_trees_print_their_source() {
    let language = language();
    for text in ["[]", "[ ]", "[1]", "[1,2,3]", "[ 1 , 22 ,333 ] ", " [4]"] {
        let tree = parse_tree(&language, text).unwrap_or_else(|error| panic!("{text:?}: {error}"));
        assert_eq!(print(&tree), text);
    }
}

#[test]
fn tree_shape() {
    let tree = parse_tree(&language(), "[1, 2]").unwrap();
    expect![[r#"
        List
          Punct "["
          items.0: Item
            value: Digits "1"
          Punct ","
          Space " "
          items.1: Item
            value: Digits "2"
          Punct "]"
    "#]]
    .assert_eq(&tree.debug_tree());
}

#[test]
fn list_references_count_in_match_order() {
    let tree = parse_tree(&language(), "[7,8,9]").unwrap();
    let texts: Vec<String> = (0..3)
        .map(|index| {
            let item = tree.get(&Path::new("items", Some(index))).and_then(|child| child.as_node()).unwrap();
            print(item)
        })
        .collect();
    assert_eq!(texts, ["7", "8", "9"]);
    assert!(tree.get(&Path::new("items", Some(3))).is_none());
}

#[test]
fn rejected_attempts_leave_no_tags() {
    let log = parse_log(&language(), "[1 ]").unwrap();
    assert_eq!(log.text(), "[1 ]");
    let commas = log.tags().iter().filter_map(|tag| tag.literal()).filter(|literal| literal.text() == ",").count();
    assert_eq!(commas, 0);
    assert_eq!(log.pair(0), Some(log.len() - 1));
}

#[test]
fn tags_stream_before_the_run_ends() {
    let language = language();
    let mut tags = parse(&language, "[1,2");
    let first = tags.next().unwrap().unwrap();
    assert_eq!(first.to_string(), "<List>");
    let error = tags.find_map(Result::err).unwrap();
    assert_eq!(error.kind(), &ErrorKind::UnclosedSpan { closer: "]".to_owned() });
    assert!(tags.next().is_none());
}

#[test]
fn unclosed_and_unconsumed_input() {
    let language = language();
    let error = parse_tree(&language, "[1,2").unwrap_err();
    assert_eq!(error.kind(), &ErrorKind::UnclosedSpan { closer: "]".to_owned() });

    let error = parse_tree(&language, "[1]x").unwrap_err();
    assert_eq!(error.kind(), &ErrorKind::UnconsumedInput { ty: "List".to_owned() });
    assert_eq!(error.offset(), Some(TextSize::from(3)));

    let error = parse_tree(&language, "[1,]").unwrap_err();
    assert_eq!(error.kind(), &ErrorKind::NoMatch { ty: "\"]\"".to_owned() });
    assert_eq!(error.offset(), Some(TextSize::from(2)));
}

#[test]
fn rebuilding_reuses_literals() {
    let language = language();
    let tree = parse_tree(&language, "[1, 22 ,3]").unwrap();
    let rebuilt = build(&language, &tree).unwrap();
    assert_eq!(print(&rebuilt), "[1, 22 ,3]");
    assert_eq!(rebuilt.debug_tree(), tree.debug_tree());
}

#[test]
fn abstract_trees_rebuild_canonically() {
    let language = language();
    let tree = parse_tree(&language, " [ 1 ,  2 ] ").unwrap();
    let rebuilt = build(&language, &tree.to_abstract()).unwrap();
    assert_eq!(print(&rebuilt), "[1,2]");
}

#[test]
fn building_checks_the_root_type() {
    let language = language();
    let tree = parse_tree(&language, "[1]").unwrap();
    let Some(item) = tree.get(&Path::new("items", Some(0))).and_then(|child| child.as_node()) else {
        panic!("no first item");
    };
    let error = build(&language, item).unwrap_err();
    assert_eq!(error.kind(), &ErrorKind::NoMatch { ty: "List".to_owned() });
}

async fn blank(cx: Cx) -> Result<()> {
    cx.eat(class(CharClass::Whitespace).repeat(0, None)).await?;
    Ok(())
}

async fn blanks_then_digits(cx: Cx) -> Result<()> {
    let mut attempts: i64 = 0;
    while cx.eat_match(token("Blank")).await?.is_some() {
        attempts += 1;
    }
    cx.eat(token("Digits").at("value")).await?;
    cx.bind_attribute("blanks", attempts).await?;
    Ok(())
}

#[test]
fn empty_matches_do_not_count() {
    let language = Language::builder("Blanks")
        .root("Root")
        .node("Root", blanks_then_digits)
        .token("Blank", blank)
        .token("Digits", digits)
        .enhance(Enhancer::nodes())
        .build()
        .unwrap();

    let tree = parse_tree(&language, "  12").unwrap();
    assert_eq!(print(&tree), "  12");
    assert_eq!(tree.attribute("blanks").map(ToString::to_string).as_deref(), Some("1"));

    let tree = parse_tree(&language, "12").unwrap();
    assert_eq!(tree.attribute("blanks").map(ToString::to_string).as_deref(), Some("0"));
}

async fn value(cx: Cx) -> Result<()> {
    cx.eat(node("Value").at("value")).await?;
    Ok(())
}

async fn word_node(cx: Cx) -> Result<()> {
    cx.eat(token("Word").at("value")).await?;
    Ok(())
}

fn covered() -> Language {
    Language::builder("Values")
        .root("Root")
        .node("Root", value)
        .node("Item", item)
        .node("Word", word_node)
        .token("Digits", digits)
        .token("Word", word)
        .cover("Value", ["Item", "Word"])
        .enhance(Enhancer::nodes())
        .build()
        .unwrap()
}

async fn peeking(cx: Cx) -> Result<()> {
    assert!(cx.probe(token("Word")).await?.is_some());
    assert!(cx.probe(node("Inner").at("x")).await?.is_some());
    cx.eat(node("Inner").at("x")).await?;
    Ok(())
}

#[test]
fn lookahead_leaves_nothing_behind() {
    let language = Language::builder("Peek")
        .root("Root")
        .node("Root", peeking)
        .node("Inner", word_node)
        .token("Word", word)
        .enhance(Enhancer::nodes())
        .build()
        .unwrap();
    let tree = parse_tree(&language, "ab").unwrap();
    assert_eq!(print(&tree), "ab");
    assert_eq!(tree.children().count(), 1);
    expect![[r#"
        Root
          x: Inner
            value: Word "ab"
    "#]]
    .assert_eq(&tree.debug_tree());
}

#[test]
fn aliases_try_covered_types_in_order() {
    let language = covered();
    for (text, ty) in [("42", "Item"), ("abc", "Word")] {
        let tree = parse_tree(&language, text).unwrap();
        let value = tree.get(&Path::new("value", None)).unwrap();
        assert_eq!(value.ty().as_str(), ty);
        assert_eq!(build(&language, &tree).unwrap().to_string(), text);
    }
    let error = parse_tree(&language, "?").unwrap_err();
    assert!(matches!(error.kind(), ErrorKind::NoMatch { .. }));
}

#[test]
fn cover_cycles_are_rejected() {
    let error = Language::builder("Cyclic")
        .root("Root")
        .node("Root", value)
        .cover("Value", ["Other"])
        .cover("Other", ["Value"])
        .build()
        .err()
        .unwrap();
    assert!(matches!(error.kind(), ErrorKind::CoverCycle { .. }));
}

struct Guard(Rc<Cell<bool>>);

impl Drop for Guard {
    fn drop(&mut self) {
        self.0.set(true);
    }
}

async fn doomed(cx: Cx, dropped: Rc<Cell<bool>>) -> Result<()> {
    let _guard = Guard(dropped);
    cx.eat(token("Word").at("value")).await?;
    Ok(())
}

async fn maybe_doomed(cx: Cx) -> Result<()> {
    cx.eat_match(node("Doomed").at("doomed")).await?;
    cx.eat(token("Digits").at("value")).await?;
    Ok(())
}

#[test]
fn failed_productions_release_their_locals() {
    let dropped = Rc::new(Cell::new(false));
    let seen = Rc::clone(&dropped);
    let language = Language::builder("Cleanup")
        .root("Root")
        .node("Root", maybe_doomed)
        .node("Doomed", move |cx| doomed(cx, Rc::clone(&seen)))
        .token("Word", word)
        .token("Digits", digits)
        .enhance(Enhancer::nodes())
        .build()
        .unwrap();

    let tree = parse_tree(&language, "7").unwrap();
    assert!(dropped.get());
    assert!(tree.get(&Path::new("doomed", None)).is_none());
}

async fn resolved_word(cx: Cx) -> Result<()> {
    let expected: String = cx.resolve(async { Ok::<_, String>("ok".to_owned()) }).await?;
    cx.eat(token("Exact").value(&expected).at("value")).await?;
    Ok(())
}

async fn offline(cx: Cx) -> Result<()> {
    let _: String = cx.resolve(async { Err::<String, _>("offline") }).await?;
    Ok(())
}

async fn fallback(cx: Cx) -> Result<()> {
    let word = match cx.resolve(async { Err::<String, _>("offline") }).await {
        Ok(word) => word,
        Err(error) => {
            assert_eq!(error.kind(), &ErrorKind::Async("offline".to_owned()));
            "ok".to_owned()
        }
    };
    cx.eat(token("Exact").value(&word).at("value")).await?;
    Ok(())
}

async fn exact(cx: Cx) -> Result<()> {
    let value = cx.prop_str("value")?;
    cx.eat(literal(value)).await?;
    Ok(())
}

fn resolving() -> Language {
    Language::builder("Resolving")
        .root("Root")
        .node("Root", resolved_word)
        .node("Offline", offline)
        .token("Exact", exact)
        .enhance(Enhancer::nodes())
        .build()
        .unwrap()
}

#[test]
fn the_sync_driver_cannot_resolve() {
    let error = parse_tree(&resolving(), "ok").unwrap_err();
    assert_eq!(error.kind(), &ErrorKind::ResolveInSyncDriver { ty: "Root".to_owned() });
}

#[tokio::test]
async fn the_async_driver_resolves() {
    let language = resolving();
    let tree = parse_tree_async(&language, "ok").await.unwrap();
    assert_eq!(print(&tree), "ok");

    let error = parse_tree_async(&language, "no").await.unwrap_err();
    assert!(matches!(error.kind(), ErrorKind::NoMatch { .. }));
}

#[tokio::test]
async fn failed_futures_end_the_run() {
    let language = Language::builder("Offline")
        .root("Offline")
        .node("Offline", offline)
        .enhance(Enhancer::nodes())
        .build()
        .unwrap();
    let error = parse_tree_async(&language, "").await.unwrap_err();
    assert_eq!(error.kind(), &ErrorKind::Async("offline".to_owned()));
}

#[tokio::test]
async fn productions_can_recover_from_failed_futures() {
    let language = Language::builder("Fallback")
        .root("Fallback")
        .node("Fallback", fallback)
        .token("Exact", exact)
        .enhance(Enhancer::nodes())
        .build()
        .unwrap();
    let tree = parse_tree_async(&language, "ok").await.unwrap();
    assert_eq!(print(&tree), "ok");
}

#[test]
fn tracing_leaves_the_tree_alone() {
    let traced = Language::builder("List")
        .root("List")
        .node("List", list)
        .node("Item", item)
        .token("Punct", punctuator)
        .token("Digits", digits)
        .token("Space", space)
        .enhance(Enhancer::trivia("Space"))
        .enhance(Enhancer::nodes())
        .enhance(Enhancer::trace().except(["Space"]))
        .build()
        .unwrap();
    let text = "[ 1, 2 ]";
    let tree = parse_tree(&traced, text).unwrap();
    assert_eq!(tree.debug_tree(), parse_tree(&language(), text).unwrap().debug_tree());
}
