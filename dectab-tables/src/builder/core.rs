use std::collections::BTreeSet;

use dectab_ir::{Action, Emit, Pattern};
use dectab_phash::{Hash, HashFunction, Slot};

use itertools::Itertools;
use proc_macro2::{Literal, TokenStream};
use quote::{format_ident, quote, ToTokens, TokenStreamExt};
use syn::Ident;
use ustr::Ustr;

use super::dispatch::{BindingKind, HashedTable, RowLayout};
use super::error::BuilderError;
use super::types::{BindingTokens, EmitTokens, HashTokens};

const ROW_FIELDS: &[&str] = &[
    "pattern", "nt", "ntluf", "emit", "error", "nothing", "ret", "key",
];

/// An identifier for `text`, raw if it collides with a keyword.
fn ident(text: &str) -> Ident {
    if syn::parse_str::<Ident>(text).is_ok() {
        format_ident!("{}", text)
    } else if matches!(text, "self" | "super" | "crate" | "Self" | "_") {
        format_ident!("{}_", text)
    } else {
        format_ident!("r#{}", text)
    }
}

struct RowField {
    name: Ustr,
    ident: Ident,
    kind: BindingKind,
}

fn row_fields(layout: &RowLayout) -> Vec<RowField> {
    let mut used = ROW_FIELDS
        .iter()
        .map(|name| name.to_string())
        .collect::<BTreeSet<_>>();

    layout
        .bindings()
        .iter()
        .map(|(name, kind)| {
            let base = name.to_ascii_lowercase();
            let mut field = base.clone();
            let mut n = 1;
            while !used.insert(field.clone()) {
                field = format!("{base}_{n}");
                n += 1;
            }
            RowField {
                name: *name,
                ident: ident(&field),
                kind: *kind,
            }
        })
        .collect()
}

/// Renders every bucket's hashed table as Rust items over the shared
/// `Operand` and `Nonterminal` enums.
pub struct TableGenerator {
    operands: Vec<Ustr>,
    nonterminals: Vec<Ustr>,
    names: Vec<String>,
    buckets: Vec<TokenStream>,
}

impl TableGenerator {
    pub fn new(tables: &[HashedTable]) -> Result<Self, BuilderError> {
        let operands = tables
            .iter()
            .flat_map(|table| table.dictionary().sources())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let nonterminals = tables
            .iter()
            .flat_map(|table| table.entries().iter().map(|entry| entry.pattern()))
            .flat_map(|pattern| pattern.actions().iter().filter_map(Action::nonterminal))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut slf = Self {
            operands,
            nonterminals,
            names: Vec::with_capacity(tables.len()),
            buckets: Vec::with_capacity(tables.len()),
        };

        for table in tables {
            let bucket = slf.generate_bucket(table)?;
            slf.names.push(table.bucket().snake_name());
            slf.buckets.push(bucket);
        }

        Ok(slf)
    }

    pub fn operands(&self) -> &[Ustr] {
        &self.operands
    }

    pub fn nonterminals(&self) -> &[Ustr] {
        &self.nonterminals
    }

    fn generate_enums(&self) -> TokenStream {
        let operand = self.operands.iter().map(|n| ident(n)).collect::<Vec<_>>();
        let operand_name = self.operands.iter().map(|n| n.as_str());
        let nonterminal = self.nonterminals.iter().map(|n| ident(n)).collect::<Vec<_>>();
        let nonterminal_name = self.nonterminals.iter().map(|n| n.as_str());

        quote! {
            /// Decoded operand deciders read by the key functions.
            #[allow(non_camel_case_types)]
            #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
            pub enum Operand {
                #(#operand),*
            }

            impl Operand {
                pub const ALL: &'static [Operand] = &[#(Operand::#operand),*];

                pub fn name(&self) -> &'static str {
                    match *self {
                        #(Operand::#operand => #operand_name),*
                    }
                }
            }

            /// Nonterminals and lookup functions called by table rows.
            #[allow(non_camel_case_types)]
            #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
            pub enum Nonterminal {
                #(#nonterminal),*
            }

            impl Nonterminal {
                pub const ALL: &'static [Nonterminal] = &[#(Nonterminal::#nonterminal),*];

                pub fn name(&self) -> &'static str {
                    match *self {
                        #(Nonterminal::#nonterminal => #nonterminal_name),*
                    }
                }
            }
        }
    }

    /// Every bucket's lookup by snake-case bucket name, yielding the id of
    /// the matched pattern.
    fn generate_index(&self) -> TokenStream {
        let entries = self.names.iter().map(|name| {
            let lookup_fn = format_ident!("lookup_{}", name);
            quote! {
                (#name, |source| #lookup_fn(source).map(|row| row.pattern))
            }
        });

        quote! {
            pub static LOOKUPS: &[(
                &str,
                fn(&dyn ::dectab_tables::runtime::OperandSource<Operand>) -> Option<u32>,
            )] = &[#(#entries),*];
        }
    }

    fn generate_key_fn(&self, table: &HashedTable, name: &Ident) -> TokenStream {
        let dictionary = table.dictionary();

        let terms = dictionary
            .cnames()
            .iter()
            .zip(dictionary.shifts())
            .map(|(cname, shift)| {
                let value = match dictionary.synthetic().get(cname) {
                    Some(token) => {
                        let mut conds =
                            token.derivation().terms().iter().map(|(source, literal)| {
                                let source = ident(source);
                                let literal = Literal::u32_unsuffixed(*literal);
                                quote! { source.operand(Operand::#source) == #literal }
                            });
                        if token.derivation().terms().len() == 1 {
                            let cond = conds.next();
                            quote! { (#cond) as u64 }
                        } else {
                            let conds = conds.map(|cond| quote! { (#cond) });
                            quote! { (#(#conds)&*) as u64 }
                        }
                    }
                    None => {
                        let source = ident(cname);
                        quote! { source.operand(Operand::#source) as u64 }
                    }
                };
                // `x as u64 << n` reads as a generic argument list
                if *shift == 0 {
                    value
                } else {
                    let shift = Literal::u32_unsuffixed(*shift);
                    quote! { (#value) << #shift }
                }
            })
            .collect::<Vec<_>>();

        let bound = quote! { S: ::dectab_tables::runtime::OperandSource<Operand> + ?Sized };

        if terms.is_empty() {
            quote! {
                #[inline]
                pub fn #name<#bound>(_source: &S) -> u64 {
                    0
                }
            }
        } else {
            quote! {
                #[inline]
                pub fn #name<#bound>(source: &S) -> u64 {
                    #(#terms)|*
                }
            }
        }
    }

    fn generate_row(
        &self,
        table: &HashedTable,
        row: &Ident,
        fields: &[RowField],
        pattern: &Pattern,
        key: u64,
    ) -> TokenStream {
        let layout = table.layout();
        let id = Literal::u32_unsuffixed(pattern.id().index() as u32);

        let mut nt = Vec::new();
        let mut ntluf = Vec::new();
        let mut emit = Vec::<&Emit>::new();
        let mut error = false;
        let mut nothing = false;
        let mut ret = None;

        for action in pattern.actions() {
            match action {
                Action::Nt(name) => nt.push(ident(name)),
                Action::Ntluf(name) => ntluf.push(ident(name)),
                Action::Emit(e) => emit.push(e),
                Action::Error => error = true,
                Action::Nothing => nothing = true,
                Action::Return(v) => ret = ret.or(Some(*v)),
                Action::FieldBinding { .. } => (),
            }
        }

        let mut values = quote! { pattern: #id, };

        for field in fields {
            let value = pattern.actions().iter().find_map(|action| match action {
                Action::FieldBinding { name, value } if *name == field.name => Some(value),
                _ => None,
            });
            let binding = BindingTokens {
                value,
                as_str: field.kind == BindingKind::Str,
            };
            let ident = &field.ident;
            values.append_all(quote! { #ident: #binding, });
        }

        if layout.has_nt() {
            values.append_all(quote! { nt: &[#(Nonterminal::#nt),*], });
        }
        if layout.has_ntluf() {
            values.append_all(quote! { ntluf: &[#(Nonterminal::#ntluf),*], });
        }
        if layout.has_emit() {
            let chunks = emit.into_iter().map(EmitTokens);
            values.append_all(quote! { emit: &[#(#chunks),*], });
        }
        if layout.has_error() {
            values.append_all(quote! { error: #error, });
        }
        if layout.has_nothing() {
            values.append_all(quote! { nothing: #nothing, });
        }
        if layout.has_return() {
            let ret = match ret {
                Some(v) => {
                    let v = Literal::u64_unsuffixed(v);
                    quote! { Some(#v) }
                }
                None => quote! { None },
            };
            values.append_all(quote! { ret: #ret, });
        }
        if layout.validated() {
            let key = Literal::u64_unsuffixed(key);
            values.append_all(quote! { key: #key, });
        }

        quote! { Some(#row { #values }) }
    }

    fn generate_slots<F>(&self, hash: &Hash, at: F, emitted: &mut usize) -> Vec<TokenStream>
    where
        F: Fn(usize) -> Option<TokenStream>,
    {
        (0..hash.size())
            .map(|index| match at(index) {
                Some(row) => {
                    *emitted += 1;
                    row
                }
                None => quote! { None },
            })
            .collect()
    }

    fn generate_bucket(&self, table: &HashedTable) -> Result<TokenStream, BuilderError> {
        let bucket = table.bucket();
        let snake = bucket.snake_name();
        let row = format_ident!("Row{}", bucket.camel_name());
        let key_fn = format_ident!("key_{}", snake);
        let lookup_fn = format_ident!("lookup_{}", snake);
        let table_name = format_ident!("TABLE_{}", snake.to_ascii_uppercase());

        let layout = table.layout();
        let fields = row_fields(layout);

        let mut decl = quote! { pub pattern: u32, };
        for field in fields.iter() {
            let ident = &field.ident;
            let ty = match field.kind {
                BindingKind::Int => quote! { Option<u64> },
                BindingKind::Str => quote! { Option<&'static str> },
            };
            decl.append_all(quote! { pub #ident: #ty, });
        }
        if layout.has_nt() {
            decl.append_all(quote! { pub nt: &'static [Nonterminal], });
        }
        if layout.has_ntluf() {
            decl.append_all(quote! { pub ntluf: &'static [Nonterminal], });
        }
        if layout.has_emit() {
            decl.append_all(quote! { pub emit: &'static [::dectab_tables::runtime::EmitChunk], });
        }
        if layout.has_error() {
            decl.append_all(quote! { pub error: bool, });
        }
        if layout.has_nothing() {
            decl.append_all(quote! { pub nothing: bool, });
        }
        if layout.has_return() {
            decl.append_all(quote! { pub ret: Option<u64>, });
        }

        let matches = if layout.validated() {
            decl.append_all(quote! { pub key: u64, });
            quote! {
                #[inline]
                fn matches(&self, key: u64) -> bool {
                    self.key == key
                }
            }
        } else {
            quote! {
                #[inline]
                fn matches(&self, _key: u64) -> bool {
                    true
                }
            }
        };

        let row_at = |slot: Slot| {
            table
                .entry_at(slot)
                .map(|entry| self.generate_row(table, &row, &fields, entry.pattern(), entry.key()))
        };

        let mut emitted = 0;
        let body = match table.function() {
            HashFunction::OneLevel(hash) => {
                let slots = self.generate_slots(hash, |i| row_at(Slot::Direct(i)), &mut emitted);
                let hash = HashTokens(*hash);
                quote! {
                    ::dectab_tables::runtime::DispatchTable::Direct {
                        hash: #hash,
                        rows: &[#(#slots),*],
                    }
                }
            }
            HashFunction::TwoLevel { first, buckets } => {
                let nested = buckets
                    .iter()
                    .enumerate()
                    .map(|(b, second)| match second {
                        Some(second) => {
                            let slots = self.generate_slots(
                                second,
                                |index| row_at(Slot::Nested { bucket: b, index }),
                                &mut emitted,
                            );
                            let hash = HashTokens(*second);
                            quote! {
                                Some(::dectab_tables::runtime::Bucket {
                                    hash: #hash,
                                    rows: &[#(#slots),*],
                                })
                            }
                        }
                        None => quote! { None },
                    })
                    .collect::<Vec<_>>();
                let first = HashTokens(*first);
                quote! {
                    ::dectab_tables::runtime::DispatchTable::TwoLevel {
                        hash: #first,
                        buckets: &[#(#nested),*],
                    }
                }
            }
        };

        if emitted != table.entries().len() {
            return Err(BuilderError::invariant(format!(
                "{bucket}: emitted {emitted} rows for {} entries",
                table.entries().len()
            )));
        }

        let key_fn_body = self.generate_key_fn(table, &key_fn);
        let doc = format!(
            " {bucket}: {} over [{}]",
            table.function().kind(),
            table.dictionary().cnames().iter().join(", ")
        );

        Ok(quote! {
            #[doc = #doc]
            #[derive(Debug, Clone, Copy, PartialEq, Eq)]
            pub struct #row {
                #decl
            }

            impl ::dectab_tables::runtime::Row for #row {
                #matches
            }

            #key_fn_body

            pub static #table_name: ::dectab_tables::runtime::DispatchTable<#row> = #body;

            #[inline]
            pub fn #lookup_fn<S: ::dectab_tables::runtime::OperandSource<Operand> + ?Sized>(
                source: &S,
            ) -> Option<&'static #row> {
                #table_name.lookup(#key_fn(source))
            }
        })
    }
}

impl ToTokens for TableGenerator {
    fn to_tokens(&self, tokens: &mut TokenStream) {
        tokens.append_all(self.generate_enums());
        tokens.append_all(self.buckets.iter());
        tokens.append_all(self.generate_index());
    }
}
