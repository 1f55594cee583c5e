// Parser for `.mir` source files.
//
// Parses a token stream (from the lexer) into an AST. Uses chumsky
// combinators.
//
// Preconditions: input is a valid token stream from `lexer::lex()`.
// Postconditions: returns an AST plus any parse errors (non-fatal).
// Failure modes: syntax errors produce `Rich` diagnostics.
// Side effects: none.

use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;
use chumsky::span::SimpleSpan;

use crate::ast::*;
use crate::lexer::Token;

/// Result of parsing: AST plus any errors.
#[derive(Debug)]
pub struct ParseResult {
    pub program: Option<Program>,
    pub errors: Vec<Rich<'static, Token, SimpleSpan>>,
}

/// Parse a `.mir` source string. Lexes then parses.
pub fn parse(source: &str) -> ParseResult {
    let lex_result = crate::lexer::lex(source);
    let len = source.len();

    let token_iter = lex_result.tokens.into_iter().map(|(tok, span)| {
        let cspan: SimpleSpan = (span.start..span.end).into();
        (tok, cspan)
    });
    let eoi: SimpleSpan = (len..len).into();
    let stream = Stream::from_iter(token_iter).map(eoi, |(t, s): (_, _)| (t, s));

    let parser = program_parser(source);
    let (program, parse_errors) = parser.parse(stream).into_output_errors();

    let mut all_errors: Vec<Rich<'static, Token, SimpleSpan>> = lex_result
        .errors
        .into_iter()
        .map(|e| {
            let span: SimpleSpan = (e.span.start..e.span.end).into();
            Rich::custom(span, e.message)
        })
        .collect();
    all_errors.extend(parse_errors.into_iter().map(|e| e.into_owned()));

    ParseResult {
        program,
        errors: all_errors,
    }
}

// ── Main parser builder ──
//
// All grammar rules are built inside `program_parser` so that the `source`
// reference is captured once and shared by all combinators.

fn program_parser<'tokens, 'src: 'tokens, I>(
    source: &'src str,
) -> impl Parser<'tokens, I, Program, extra::Err<Rich<'tokens, Token, SimpleSpan>>> + 'src
where
    'tokens: 'src,
    I: ValueInput<'tokens, Token = Token, Span = SimpleSpan>,
{
    let nl = just(Token::Newline).repeated().ignored();

    let ident = just(Token::Ident).map_with(move |_, e| {
        let span: SimpleSpan = e.span();
        Ident {
            name: source[span.start()..span.end()].to_string(),
            span,
        }
    });

    // ── Place: target '/' precision '/' layout ──

    let place = ident
        .clone()
        .then_ignore(just(Token::Slash))
        .then(ident.clone())
        .then_ignore(just(Token::Slash))
        .then(ident.clone())
        .map_with(|((target, precision), layout), e| PlaceLit {
            target,
            precision,
            layout,
            span: e.span(),
        });

    // ── set_stmt ──

    let place_list = place
        .clone()
        .separated_by(just(Token::Comma))
        .at_least(1)
        .allow_trailing()
        .collect::<Vec<_>>()
        .delimited_by(just(Token::LBracket), just(Token::RBracket))
        .map_with(|places, e| SetValue::Places(places, e.span()));

    let set_stmt = just(Token::Set)
        .ignore_then(ident.clone())
        .then_ignore(just(Token::Equals))
        .then(place_list.or(ident.clone().map(SetValue::Ident)))
        .map(|(name, value)| StatementKind::Set(SetStmt { name, value }));

    // ── kernel_stmt ──

    let sig_list = ident
        .clone()
        .then_ignore(just(Token::Colon))
        .then(place.clone())
        .map(|(formal, ty)| ParamSig { formal, ty })
        .separated_by(just(Token::Comma))
        .allow_trailing()
        .collect::<Vec<_>>()
        .delimited_by(just(Token::LParen), just(Token::RParen));

    let kernel_stmt = just(Token::Kernel)
        .ignore_then(ident.clone())
        .then(ident.clone().or_not())
        .then_ignore(just(Token::At))
        .then(place.clone())
        .then(sig_list.clone())
        .then_ignore(just(Token::Arrow))
        .then(sig_list)
        .map(|((((op, alias), place), inputs), outputs)| {
            StatementKind::Kernel(KernelStmt {
                op,
                alias,
                place,
                inputs,
                outputs,
            })
        });

    // ── arg_stmt ──

    let arg_stmt = just(Token::Arg)
        .ignore_then(ident.clone())
        .then(just(Token::Colon).ignore_then(place.clone()).or_not())
        .map(|(name, ty)| StatementKind::Arg(ArgStmt { name, ty }));

    // ── inst_stmt ──

    let names = ident
        .clone()
        .separated_by(just(Token::Comma))
        .at_least(1)
        .allow_trailing()
        .collect::<Vec<_>>()
        .delimited_by(just(Token::LBracket), just(Token::RBracket))
        .or(ident.clone().map(|name| vec![name]));

    let binding_list = ident
        .clone()
        .then_ignore(just(Token::Colon))
        .then(names)
        .map_with(|(formal, arguments), e| BindingExpr {
            formal,
            arguments,
            span: e.span(),
        })
        .separated_by(just(Token::Comma))
        .allow_trailing()
        .collect::<Vec<_>>()
        .delimited_by(just(Token::LParen), just(Token::RParen));

    let inst_stmt = just(Token::Inst)
        .ignore_then(ident.clone())
        .then(binding_list.clone())
        .then_ignore(just(Token::Arrow))
        .then(binding_list)
        .then(just(Token::At).ignore_then(place).or_not())
        .map_with(|(((op, inputs), outputs), place), e| {
            StatementKind::Inst(InstStmt {
                op,
                inputs,
                outputs,
                place,
                span: e.span(),
            })
        });

    // ── Statement dispatch ──

    let statement = choice((set_stmt, kernel_stmt, arg_stmt, inst_stmt)).map_with(|kind, e| {
        Statement {
            kind,
            span: e.span(),
        }
    });

    // ── Program ──

    nl.clone()
        .ignore_then(
            statement
                .separated_by(just(Token::Newline).repeated().at_least(1))
                .allow_trailing()
                .collect::<Vec<_>>(),
        )
        .then_ignore(nl)
        .map_with(move |statements, e| Program {
            statements,
            span: e.span(),
        })
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(source: &str) -> Program {
        let result = parse(source);
        assert!(
            result.errors.is_empty(),
            "unexpected errors: {:#?}",
            result.errors
        );
        result.program.expect("expected program")
    }

    fn parse_one_stmt(source: &str) -> StatementKind {
        let prog = parse_ok(source);
        assert_eq!(prog.statements.len(), 1, "expected 1 statement");
        prog.statements.into_iter().next().unwrap().kind
    }

    #[test]
    fn empty_program() {
        assert!(parse_ok("").statements.is_empty());
        assert!(parse_ok("\n# only a comment\n\n").statements.is_empty());
    }

    #[test]
    fn set_place_list() {
        match parse_one_stmt("set valid_places = [cuda/float32/nchw, host/float32/nchw]") {
            StatementKind::Set(SetStmt {
                name,
                value: SetValue::Places(places, _),
            }) => {
                assert_eq!(name.name, "valid_places");
                assert_eq!(places.len(), 2);
                assert_eq!(places[0].target.name, "cuda");
                assert_eq!(places[1].layout.name, "nchw");
            }
            other => panic!("expected set with places, got {:?}", other),
        }
    }

    #[test]
    fn set_ident_value() {
        match parse_one_stmt("set pick_io_copy_kernel = true") {
            StatementKind::Set(SetStmt {
                value: SetValue::Ident(v),
                ..
            }) => assert_eq!(v.name, "true"),
            other => panic!("expected set with ident, got {:?}", other),
        }
    }

    #[test]
    fn kernel_with_alias() {
        match parse_one_stmt(
            "kernel io_copy host_to_device @ cuda/any/any (Input: host/any/any) -> (Out: cuda/any/any)",
        ) {
            StatementKind::Kernel(k) => {
                assert_eq!(k.op.name, "io_copy");
                assert_eq!(k.alias.map(|a| a.name).as_deref(), Some("host_to_device"));
                assert_eq!(k.place.target.name, "cuda");
                assert_eq!(k.inputs.len(), 1);
                assert_eq!(k.inputs[0].formal.name, "Input");
                assert_eq!(k.outputs[0].ty.target.name, "cuda");
            }
            other => panic!("expected kernel, got {:?}", other),
        }
    }

    #[test]
    fn kernel_without_alias() {
        match parse_one_stmt(
            "kernel fc @ cuda/float32/nchw (Input: cuda/float32/nchw, W: cuda/float32/nchw) -> (Out: cuda/float32/nchw)",
        ) {
            StatementKind::Kernel(k) => {
                assert!(k.alias.is_none());
                assert_eq!(k.inputs.len(), 2);
            }
            other => panic!("expected kernel, got {:?}", other),
        }
    }

    #[test]
    fn arg_with_and_without_type() {
        match parse_one_stmt("arg x: host/float32/nchw") {
            StatementKind::Arg(a) => {
                assert_eq!(a.name.name, "x");
                assert_eq!(a.ty.unwrap().precision.name, "float32");
            }
            other => panic!("expected arg, got {:?}", other),
        }
        match parse_one_stmt("arg fc_0.tmp_0") {
            StatementKind::Arg(a) => {
                assert_eq!(a.name.name, "fc_0.tmp_0");
                assert!(a.ty.is_none());
            }
            other => panic!("expected arg, got {:?}", other),
        }
    }

    #[test]
    fn inst_with_single_and_list_bindings() {
        match parse_one_stmt("inst concat(X: [a, b], Axis: c) -> (Out: y) @ host/float32/nchw") {
            StatementKind::Inst(i) => {
                assert_eq!(i.op.name, "concat");
                assert_eq!(i.inputs.len(), 2);
                let names: Vec<&str> = i.inputs[0]
                    .arguments
                    .iter()
                    .map(|a| a.name.as_str())
                    .collect();
                assert_eq!(names, vec!["a", "b"]);
                assert_eq!(i.inputs[1].arguments.len(), 1);
                assert_eq!(i.outputs[0].formal.name, "Out");
                assert_eq!(i.place.unwrap().target.name, "host");
            }
            other => panic!("expected inst, got {:?}", other),
        }
    }

    #[test]
    fn inst_without_place() {
        match parse_one_stmt("inst relu(X: x) -> (Out: y)") {
            StatementKind::Inst(i) => assert!(i.place.is_none()),
            other => panic!("expected inst, got {:?}", other),
        }
    }

    #[test]
    fn multiple_statements() {
        let prog = parse_ok(concat!(
            "# program\n",
            "arg x: host/float32/nchw\n",
            "\n",
            "inst relu(X: x) -> (Out: y)\n",
            "inst relu(X: y) -> (Out: z)\n",
        ));
        assert_eq!(prog.statements.len(), 3);
        assert!(matches!(prog.statements[0].kind, StatementKind::Arg(_)));
        assert!(matches!(prog.statements[2].kind, StatementKind::Inst(_)));
    }

    #[test]
    fn statement_spans() {
        let prog = parse_ok("arg x\narg yy");
        assert_eq!(prog.statements[1].span.start(), 6);
        assert_eq!(prog.statements[1].span.end(), 12);
    }

    #[test]
    fn missing_arrow_is_error() {
        let result = parse("inst relu(X: x) (Out: y)");
        assert!(!result.errors.is_empty());
    }

    #[test]
    fn incomplete_place_is_error() {
        let result = parse("arg x: host/float32");
        assert!(!result.errors.is_empty());
    }

    #[test]
    fn lex_errors_are_reported() {
        let result = parse("arg x$");
        assert!(!result.errors.is_empty());
    }
}
