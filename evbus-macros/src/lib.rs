use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

mod message;

/// 派生 `::evbus_core::message::Message`
/// - 可选参数：`#[message(topic = "...", channel = "...")]`
/// - 未声明时主题/通道回退为类型名，由 `TopicResolver` 负责解析
/// - 支持泛型结构体与枚举（泛型参数需满足 `Send + Sync + 'static`）
#[proc_macro_derive(Message, attributes(message))]
pub fn derive_message(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    message::expand(input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}
