//! JSON as a [`Language`]. Every byte of a document, whitespace included, ends
//! up in the tree, so parsed documents print back unchanged.

use quill_engine::{CharClass, Contexts, Cx, Enhancer, Language, Matchable, class, fragment, literal, node, token};
use quill_errors::Result;

pub fn language() -> Result<Language> {
    Language::builder("JSON")
        .root("Document")
        .node("Document", document)
        .node("Object", object)
        .node("Property", property)
        .node("Array", array)
        .node("String", string)
        .node("Number", number)
        .node("Literal", keyword_literal)
        .cover("Expression", ["Object", "Array", "String", "Number", "Literal"])
        .token("Punctuator", punctuator)
        .token("StringContent", string_content)
        .token("Numeral", numeral)
        .token("Keyword", keyword)
        .token("Whitespace", whitespace)
        .fragment("Escape", escape)
        .contexts("Punctuator", Contexts::Any)
        .contexts("StringContent", Contexts::only(["String"]))
        .contexts("Escape", Contexts::only(["String"]))
        .enhance(Enhancer::trivia("Whitespace").except(["String"]))
        .enhance(Enhancer::nodes())
        .build()
}

fn punct(value: &str) -> Matchable {
    token("Punctuator").value(value)
}

async fn document(cx: Cx) -> Result<()> {
    cx.eat(node("Expression").at("value")).await?;
    Ok(())
}

async fn object(cx: Cx) -> Result<()> {
    cx.eat(punct("{").balanced("}")).await?;
    separated(&cx, node("Property").at("properties[]")).await?;
    cx.eat(punct("}").balancer()).await?;
    Ok(())
}

async fn property(cx: Cx) -> Result<()> {
    cx.eat(node("String").at("key")).await?;
    cx.eat(punct(":")).await?;
    cx.eat(node("Expression").at("value")).await?;
    Ok(())
}

async fn array(cx: Cx) -> Result<()> {
    cx.eat(punct("[").balanced("]")).await?;
    separated(&cx, node("Expression").at("elements[]")).await?;
    cx.eat(punct("]").balancer()).await?;
    Ok(())
}

/// Zero or more `element`s separated by commas. A trailing comma is left
/// unconsumed for the caller to trip over.
async fn separated(cx: &Cx, element: Matchable) -> Result<()> {
    if cx.eat_match(element.clone()).await?.is_none() {
        return Ok(());
    }
    loop {
        cx.branch().await?;
        if cx.eat_match(punct(",")).await?.is_some() && cx.eat_match(element.clone()).await?.is_some() {
            cx.accept().await?;
        } else {
            cx.reject().await?;
            return Ok(());
        }
    }
}

async fn string(cx: Cx) -> Result<()> {
    cx.eat(punct("\"").balanced_lexical("\"", "String")).await?;
    cx.eat_match(token("StringContent").at("content")).await?;
    cx.eat(punct("\"").balancer()).await?;
    Ok(())
}

async fn number(cx: Cx) -> Result<()> {
    cx.eat(token("Numeral").at("value")).await?;
    Ok(())
}

async fn keyword_literal(cx: Cx) -> Result<()> {
    cx.eat(token("Keyword").at("value")).await?;
    Ok(())
}

async fn punctuator(cx: Cx) -> Result<()> {
    let value = cx.prop_str("value")?;
    cx.eat(literal(value)).await?;
    Ok(())
}

async fn string_content(cx: Cx) -> Result<()> {
    loop {
        if cx.eat_match(literal("\\")).await?.is_some() {
            cx.eat(fragment("Escape")).await?;
        } else if cx.eat_match(class(CharClass::NoneOf("\"\\\n".into())).one_or_more()).await?.is_none() {
            return Ok(());
        }
    }
}

async fn escape(cx: Cx) -> Result<()> {
    if cx.eat_match(literal("u")).await?.is_some() {
        cx.eat(class(CharClass::HexDigit).repeat(4, Some(4))).await?;
    } else {
        cx.eat(class(CharClass::OneOf("\"\\/bfnrt".into()))).await?;
    }
    Ok(())
}

async fn numeral(cx: Cx) -> Result<()> {
    cx.eat_match(literal("-")).await?;
    if cx.eat_match(literal("0")).await?.is_none() {
        cx.eat(class(CharClass::Range('1', '9'))).await?;
        cx.eat_match(class(CharClass::Digit).one_or_more()).await?;
    }
    if cx.eat_match(literal(".")).await?.is_some() {
        cx.eat(class(CharClass::Digit).one_or_more()).await?;
    }
    if cx.eat_match(class(CharClass::OneOf("eE".into()))).await?.is_some() {
        cx.eat_match(class(CharClass::OneOf("+-".into()))).await?;
        cx.eat(class(CharClass::Digit).one_or_more()).await?;
    }
    Ok(())
}

async fn keyword(cx: Cx) -> Result<()> {
    for keyword in ["true", "false", "null"] {
        if cx.eat_match(literal(keyword)).await?.is_some() {
            return Ok(());
        }
    }
    cx.fail().await
}

async fn whitespace(cx: Cx) -> Result<()> {
    cx.eat(class(CharClass::OneOf(" \t\r\n".into())).one_or_more()).await?;
    Ok(())
}
