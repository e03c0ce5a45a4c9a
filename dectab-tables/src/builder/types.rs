use dectab_ir::{Emit, EmitKind, FieldValue};
use dectab_phash::Hash;

use proc_macro2::{Literal, TokenStream};
use quote::{quote, ToTokens};

/// A hash descriptor as a `dectab_tables::runtime::Hash` expression.
pub struct HashTokens(pub Hash);

impl ToTokens for HashTokens {
    fn to_tokens(&self, tokens: &mut TokenStream) {
        let value = match self.0 {
            Hash::Trivial => quote! { ::dectab_tables::runtime::Hash::Trivial },
            Hash::Linear { min, size } => {
                let min = Literal::u64_unsuffixed(min);
                let size = Literal::usize_unsuffixed(size);
                quote! { ::dectab_tables::runtime::Hash::Linear { min: #min, size: #size } }
            }
            Hash::Multiplicative { multiplier, size } => {
                let multiplier = Literal::u64_unsuffixed(multiplier);
                let size = Literal::usize_unsuffixed(size);
                quote! {
                    ::dectab_tables::runtime::Hash::Multiplicative {
                        multiplier: #multiplier,
                        size: #size,
                    }
                }
            }
            Hash::Fks { a, b, size } => {
                let a = Literal::u64_unsuffixed(a);
                let b = Literal::u64_unsuffixed(b);
                let size = Literal::usize_unsuffixed(size);
                quote! { ::dectab_tables::runtime::Hash::Fks { a: #a, b: #b, size: #size } }
            }
        };
        value.to_tokens(tokens);
    }
}

/// An `emit` action as a `dectab_tables::runtime::EmitChunk` expression.
pub struct EmitTokens<'a>(pub &'a Emit);

impl<'a> ToTokens for EmitTokens<'a> {
    fn to_tokens(&self, tokens: &mut TokenStream) {
        let width = Literal::u8_unsuffixed(self.0.width());
        let value = match (self.0.kind(), self.0.value()) {
            (EmitKind::Letters, _) | (_, None) => {
                let name = self.0.text().as_str();
                quote! { ::dectab_tables::runtime::EmitChunk::Field { name: #name, width: #width } }
            }
            (EmitKind::Numeric | EmitKind::Binary, Some(value)) => {
                let value = Literal::u64_unsuffixed(value);
                quote! { ::dectab_tables::runtime::EmitChunk::Bits { value: #value, width: #width } }
            }
        };
        value.to_tokens(tokens);
    }
}

/// A field binding's value for a row field of the given representation.
pub struct BindingTokens<'a> {
    pub value: Option<&'a FieldValue>,
    pub as_str: bool,
}

impl<'a> ToTokens for BindingTokens<'a> {
    fn to_tokens(&self, tokens: &mut TokenStream) {
        let value = match self.value {
            None => quote! { None },
            Some(FieldValue::Int(v)) if !self.as_str => {
                let v = Literal::u64_unsuffixed(*v);
                quote! { Some(#v) }
            }
            Some(value) => {
                let text = value.to_string();
                quote! { Some(#text) }
            }
        };
        value.to_tokens(tokens);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn hash_paths_are_absolute() {
        let tokens = HashTokens(Hash::Linear { min: 4, size: 2 }).into_token_stream();
        let text = tokens.to_string();
        assert!(text.starts_with(":: dectab_tables"));
        assert!(text.contains("Linear { min : 4 , size : 2 }"));
    }

    #[test]
    fn emits_become_chunks() {
        let bits = EmitTokens(&Emit::binary("0b0101_0", 0b01010, 5)).into_token_stream();
        assert!(bits.to_string().contains("Bits { value : 10 , width : 5 }"));

        let field = EmitTokens(&Emit::letters("rrr")).into_token_stream();
        assert!(field.to_string().contains("Field { name : \"rrr\" , width : 3 }"));
    }

    #[test]
    fn bindings_follow_field_type() {
        let five = FieldValue::Int(5);
        let int = BindingTokens {
            value: Some(&five),
            as_str: false,
        };
        let text = BindingTokens {
            value: Some(&five),
            as_str: true,
        };
        assert_eq!(int.into_token_stream().to_string(), "Some (5)");
        assert_eq!(text.into_token_stream().to_string(), "Some (\"5\")");
    }
}
