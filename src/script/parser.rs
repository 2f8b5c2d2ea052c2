//! nom parsers for migration scripts.
//!
//! A script is plain SQL split into sections by marker lines:
//!
//! ```sql
//! -- up
//! CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
//!
//! -- down
//! DROP TABLE users;
//! ```

use nom::{
    IResult,
    branch::alt,
    bytes::complete::{is_not, tag, tag_no_case, take_until, take_while},
    character::complete::{char, not_line_ending, one_of, space0},
    combinator::{cut, eof, opt, recognize, value},
    multi::many0_count,
    sequence::{delimited, pair, tuple},
};

use super::Direction;

/// Parse a whole line as a section marker (`-- up`, `-- down`, `-- migrate:up`).
pub fn section_marker(input: &str) -> IResult<&str, Direction> {
    let (input, _) = space0(input)?;
    let (input, _) = tag("--")(input)?;
    let (input, _) = space0(input)?;
    let (input, _) = opt(tag_no_case("migrate:"))(input)?;
    let (input, direction) = alt((
        value(Direction::Up, tag_no_case("up")),
        value(Direction::Down, tag_no_case("down")),
    ))(input)?;
    let (input, _) = space0(input)?;
    let (input, _) = eof(input)?;
    Ok((input, direction))
}

/// `-- ...` up to the end of the line.
fn line_comment(input: &str) -> IResult<&str, &str> {
    recognize(pair(tag("--"), not_line_ending))(input)
}

/// `/* ... */`
fn block_comment(input: &str) -> IResult<&str, &str> {
    recognize(tuple((tag("/*"), take_until("*/"), tag("*/"))))(input)
}

/// `'...'` with `''` escapes.
fn single_quoted(input: &str) -> IResult<&str, &str> {
    recognize(delimited(
        char('\''),
        many0_count(alt((tag("''"), is_not("'")))),
        char('\''),
    ))(input)
}

/// `"..."` with `""` escapes.
fn double_quoted(input: &str) -> IResult<&str, &str> {
    recognize(delimited(
        char('"'),
        many0_count(alt((tag("\"\""), is_not("\"")))),
        char('"'),
    ))(input)
}

/// `$$ ... $$` or `$tag$ ... $tag$`. A missing closing tag is a hard failure.
fn dollar_quoted(input: &str) -> IResult<&str, &str> {
    let (rest, open) = recognize(delimited(
        char('$'),
        take_while(|c: char| c.is_alphanumeric() || c == '_'),
        char('$'),
    ))(input)?;
    let (rest, _) = cut(take_until(open))(rest)?;
    let (rest, _) = tag(open)(rest)?;
    let consumed = input.len() - rest.len();
    Ok((rest, &input[..consumed]))
}

#[derive(Clone, Copy)]
enum Token {
    Comment,
    Text,
    Blank,
}

fn token(input: &str) -> IResult<&str, Token> {
    alt((
        value(Token::Comment, line_comment),
        value(Token::Comment, block_comment),
        value(Token::Text, single_quoted),
        value(Token::Text, double_quoted),
        value(Token::Text, dollar_quoted),
        plain,
        value(Token::Text, recognize(one_of("-/$"))),
    ))(input)
}

fn plain(input: &str) -> IResult<&str, Token> {
    let (rest, chunk) = is_not("'\";$-/")(input)?;
    let kind = if chunk.trim().is_empty() {
        Token::Blank
    } else {
        Token::Text
    };
    Ok((rest, kind))
}

/// Consume one statement body up to (not including) its terminating `;`.
///
/// Returns the remaining input and the span covering the first through the
/// last non-comment token, or `None` when the body is only comments and
/// whitespace.
fn statement_body(input: &str) -> (&str, Option<(usize, usize)>) {
    let mut rest = input;
    let mut span: Option<(usize, usize)> = None;

    while let Ok((after, t)) = token(rest) {
        if matches!(t, Token::Text) {
            let start = input.len() - rest.len();
            let end = input.len() - after.len();
            span = Some(span.map_or((start, end), |(s, _)| (s, end)));
        }
        rest = after;
    }

    (rest, span)
}

/// Split a section body into statements, dropping empty and comment-only ones.
pub fn split_statements(input: &str) -> Result<Vec<String>, String> {
    let mut statements = Vec::new();
    let mut rest = input;

    while !rest.trim().is_empty() {
        let (after, span) = statement_body(rest);

        let after = match alt((tag::<_, _, nom::error::Error<&str>>(";"), eof))(after) {
            Ok((after, _)) => after,
            Err(_) => {
                let line = input[..input.len() - after.len()].lines().count().max(1);
                return Err(format!("unterminated quoted text or comment near line {}", line));
            }
        };

        if let Some((start, end)) = span {
            statements.push(rest[start..end].trim().to_string());
        }
        rest = after;
    }

    Ok(statements)
}
