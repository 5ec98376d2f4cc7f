// Parser for hlsopt .hls source files.
//
// Parses a token stream (from the lexer) into an AST. Uses chumsky
// combinators.
//
// Grammar (newline-terminated statements):
//   program   := stmt*
//   stmt      := set | array | loop | region
//   set       := 'set' IDENT '=' (INT | IDENT)
//   array     := 'array' IDENT '[' INT (',' INT)* ']' ':' IDENT ('@' INT)?
//   loop      := 'loop' IDENT '=' sint 'to' sint ('step' INT)? 'pipeline'?
//                '{' (loop | access)* '}'
//   access    := ('read' | 'write') IDENT '[' expr (',' expr)* ']'
//   region    := 'region' IDENT '{' node* '}'
//   node      := 'node' IDENT '(' idents? ')' ('->' '(' idents? ')')?
//   expr      := term (('+' | '-') term)*
//   term      := unary (('*' | 'mod' | 'floordiv' | 'ceildiv') unary)*
//   unary     := '-' unary | INT | IDENT | '(' expr ')'
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

/// Parse a source string. Lexes then parses.
pub fn parse(source: &str) -> ParseResult {
    let lex_result = crate::lexer::lex(source);
    let len = source.len();

    // Convert lexer output to chumsky stream.
    let token_iter = lex_result.tokens.into_iter().map(|(tok, span)| {
        let cspan: SimpleSpan = (span.start..span.end).into();
        (tok, cspan)
    });
    let eoi: SimpleSpan = (len..len).into();
    let stream = Stream::from_iter(token_iter).map(eoi, |(t, s): (_, _)| (t, s));

    let parser = program_parser(source);
    let (program, parse_errors) = parser.parse(stream).into_output_errors();

    // Merge lex errors + parse errors.
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

fn binary(op: IndexOp, lhs: IndexExpr, rhs: IndexExpr) -> IndexExpr {
    let span: SimpleSpan = (lhs.span().start..rhs.span().end).into();
    IndexExpr::Binary(op, Box::new(lhs), Box::new(rhs), span)
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
    // ── Newlines ──

    let nl = just(Token::Newline).repeated().ignored();

    // ── Identifier ──

    let ident = just(Token::Ident).map_with(move |_, e| {
        let span: SimpleSpan = e.span();
        Ident {
            name: source[span.start()..span.end()].to_string(),
            span,
        }
    });

    // ── Integers ──

    let int = select! {
        Token::Int(n) = e => (n, e.span()),
    };

    let signed_int = just(Token::Minus)
        .or_not()
        .then(int)
        .map(|(neg, (n, _))| if neg.is_some() { -n } else { n });

    // ── Index expressions ──

    let expr = recursive(|expr| {
        let atom = select! {
            Token::Int(n) = e => IndexExpr::Int(n, e.span()),
        }
        .or(ident.clone().map(IndexExpr::Var))
        .or(expr.delimited_by(just(Token::LParen), just(Token::RParen)));

        let unary = recursive(|unary| {
            just(Token::Minus)
                .ignore_then(unary)
                .map_with(|inner, e| IndexExpr::Neg(Box::new(inner), e.span()))
                .or(atom)
        });

        let mul_op = select! {
            Token::Star => IndexOp::Mul,
            Token::Mod => IndexOp::Mod,
            Token::FloorDiv => IndexOp::FloorDiv,
            Token::CeilDiv => IndexOp::CeilDiv,
        };
        let term = unary
            .clone()
            .foldl(mul_op.then(unary).repeated(), |lhs, (op, rhs)| {
                binary(op, lhs, rhs)
            });

        let add_op = select! {
            Token::Plus => IndexOp::Add,
            Token::Minus => IndexOp::Sub,
        };
        term.clone()
            .foldl(add_op.then(term).repeated(), |lhs, (op, rhs)| {
                binary(op, lhs, rhs)
            })
    })
    .boxed();

    // ── Loop nests ──

    let loop_stmt = recursive(|loop_stmt| {
        let access = just(Token::Read)
            .to(false)
            .or(just(Token::Write).to(true))
            .then(ident.clone())
            .then(
                expr.clone()
                    .separated_by(just(Token::Comma))
                    .at_least(1)
                    .collect::<Vec<_>>()
                    .delimited_by(just(Token::LBracket), just(Token::RBracket)),
            )
            .map_with(|((is_write, array), indices), e| AccessStmt {
                is_write,
                array,
                indices,
                span: e.span(),
            });

        let item = loop_stmt
            .map(LoopBodyItem::Loop)
            .or(access.map(LoopBodyItem::Access));

        let body = nl
            .clone()
            .ignore_then(
                item.separated_by(just(Token::Newline).repeated().at_least(1))
                    .allow_trailing()
                    .collect::<Vec<_>>(),
            )
            .then_ignore(nl.clone());

        let step = select! {
            Token::Int(n) = e => (n, e.span()),
        };

        just(Token::Loop)
            .ignore_then(ident.clone())
            .then_ignore(just(Token::Equals))
            .then(signed_int.clone())
            .then_ignore(just(Token::To))
            .then(signed_int.clone())
            .then(just(Token::Step).ignore_then(step).or_not())
            .then(just(Token::Pipeline).or_not().map(|p| p.is_some()))
            .then(body.delimited_by(just(Token::LBrace), just(Token::RBrace)))
            .map_with(
                |(((((var, lower), upper), step), pipeline), body), e| LoopStmt {
                    var,
                    lower,
                    upper,
                    step,
                    pipeline,
                    body,
                    span: e.span(),
                },
            )
    })
    .boxed();

    // ── Statements ──

    let set_value = select! {
        Token::Int(n) = e => SetValue::Int(n, e.span()),
    }
    .or(ident.clone().map(SetValue::Ident));

    let set_stmt = just(Token::Set)
        .ignore_then(ident.clone())
        .then_ignore(just(Token::Equals))
        .then(set_value)
        .map(|(name, value)| StatementKind::Set(SetStmt { name, value }));

    let array_stmt = just(Token::Array)
        .ignore_then(ident.clone())
        .then(
            int.separated_by(just(Token::Comma))
                .at_least(1)
                .collect::<Vec<_>>()
                .delimited_by(just(Token::LBracket), just(Token::RBracket)),
        )
        .then_ignore(just(Token::Colon))
        .then(ident.clone())
        .then(just(Token::At).ignore_then(int).or_not())
        .map(|(((name, shape), element_type), memory_space)| {
            StatementKind::Array(ArrayDecl {
                name,
                shape,
                element_type,
                memory_space,
            })
        });

    let ident_list = ident
        .clone()
        .separated_by(just(Token::Comma))
        .collect::<Vec<_>>()
        .delimited_by(just(Token::LParen), just(Token::RParen));

    let node_decl = just(Token::Node)
        .ignore_then(ident.clone())
        .then(ident_list.clone())
        .then(just(Token::Arrow).ignore_then(ident_list).or_not())
        .map_with(|((name, inputs), outputs), e| NodeDecl {
            name,
            inputs,
            outputs: outputs.unwrap_or_default(),
            span: e.span(),
        });

    let region_body = nl
        .clone()
        .ignore_then(
            node_decl
                .separated_by(just(Token::Newline).repeated().at_least(1))
                .allow_trailing()
                .collect::<Vec<_>>(),
        )
        .then_ignore(nl.clone());

    let region_stmt = just(Token::Region)
        .ignore_then(ident.clone())
        .then(region_body.delimited_by(just(Token::LBrace), just(Token::RBrace)))
        .map(|(name, nodes)| StatementKind::Region(RegionStmt { name, nodes }));

    // ── Statement dispatch ──

    let statement = choice((
        set_stmt,
        array_stmt,
        loop_stmt.map(StatementKind::Loop),
        region_stmt,
    ))
    .map_with(|kind, e| Statement {
        kind,
        span: e.span(),
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
