//! Universally-quantified pipeline properties, as opposed to the single
//! worked examples in `end_to_end.rs`.

use snowc::lexer::tokenize;
use snowc::parser::parse_file;
use snowc::{compile, DiagnosticKind};
use std::path::Path;

fn non_newline_lexemes(src: &str) -> Vec<(snowc::lexer::TokenKind, String)> {
    let (tokens, diags) = tokenize(Path::new("t.snow"), src);
    assert!(diags.is_empty(), "{:?}", diags.into_vec());
    tokens
        .into_iter()
        .filter(|t| t.kind != snowc::lexer::TokenKind::Newline && t.kind != snowc::lexer::TokenKind::Eof)
        .map(|t| (t.kind, t.lexeme))
        .collect()
}

#[test]
fn lexer_round_trip_reproduces_the_token_stream_up_to_whitespace() {
    let src = "function: main returns: int body: return 1+2 end body end function";
    let joined = non_newline_lexemes(src)
        .iter()
        .map(|(_, lexeme)| lexeme.clone())
        .collect::<Vec<_>>()
        .join(" ");
    // Re-lexing the whitespace-normalized form must yield the same
    // (kind, lexeme) sequence as the original, since whitespace carries
    // no meaning outside of separating tokens.
    assert_eq!(non_newline_lexemes(&joined), non_newline_lexemes(src));
}

#[test]
fn parser_is_deterministic_on_identical_input() {
    let src = r#"
module: Math
  function: fact params: declare n:int returns: int
    body: declare r:int=1
      loop: init: declare i:int=1 cond: i<=n step: i=i+1
        body: r=r*i end body
      end loop
      return r
    end body
  end function
end module
"#;
    let (tokens_a, diags_a) = tokenize(Path::new("t.snow"), src);
    assert!(diags_a.is_empty());
    let (module_a, parse_diags_a) = parse_file(Path::new("t.snow"), tokens_a);
    assert!(parse_diags_a.is_empty());

    let (tokens_b, _) = tokenize(Path::new("t.snow"), src);
    let (module_b, _) = parse_file(Path::new("t.snow"), tokens_b);

    assert_eq!(module_a, module_b);
}

#[test]
fn independent_syntax_errors_are_each_reported_once() {
    let src = "function: f returns: int body:\n\
        return 1 ++\n\
        return 1 ++\n\
        return 1 ++\n\
        end body end function";
    let (tokens, lex_diags) = tokenize(Path::new("t.snow"), src);
    assert!(lex_diags.is_empty());
    let (_module, diags) = parse_file(Path::new("t.snow"), tokens);
    let unexpected: Vec<_> = diags
        .iter()
        .filter(|d| d.kind == DiagnosticKind::ParseErrorUnexpectedToken)
        .collect();
    assert_eq!(unexpected.len(), 3, "{:?}", diags.into_vec());
    // One per line, and no two share a line (no duplicate reporting of
    // the same malformed token).
    let mut lines: Vec<_> = unexpected.iter().map(|d| d.line).collect();
    lines.sort_unstable();
    lines.dedup();
    assert_eq!(lines.len(), 3);
}

#[test]
fn continue_outside_a_loop_is_a_diagnostic() {
    let source = "function: f returns: void body: continue end body end function";
    let result = compile(source, &snowc::CompilerConfig::new());
    assert!(result.listing.is_none());
    assert!(result.diagnostics.iter().any(|d| d.message.contains("'continue'")));
}

#[test]
fn global_write_is_observed_by_a_later_read_in_another_function() {
    let source = r#"
declare counter: int = 0
function: bump returns: void body: counter=counter+1 end body end function
function: main returns: int body: bump()
  bump()
  return counter
  end body
end function
"#;
    let result = compile(source, &snowc::CompilerConfig::new());
    let listing = result.listing.unwrap_or_else(|| panic!("{:?}", result.diagnostics.into_vec()));
    assert_eq!(snow_vm::run_listing(&listing, &[]).unwrap(), 2);
}
