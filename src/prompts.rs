//! Built-in storefront prompt templates.
//!
//! Registered once at startup alongside the tools. Each template exercises
//! the `{{var}}` and `{{#if var}}...{{/if}}` forms the engine supports; the
//! prose itself is deliberately plain.

use crate::mcp::prompt::{PromptArgument, PromptDescriptor, PromptRegistry};

/// Registers every built-in prompt on the given registry.
pub fn register_all(registry: &mut PromptRegistry) {
    registry.register(product_discovery());
    registry.register(cart_review());
    registry.register(order_support());
}

fn product_discovery() -> PromptDescriptor {
    PromptDescriptor {
        name: "product-discovery".to_string(),
        description: "Guide a shopper from a vague need to concrete product candidates"
            .to_string(),
        arguments: vec![
            PromptArgument {
                name: "need".to_string(),
                description: "What the shopper says they are looking for".to_string(),
                required: true,
            },
            PromptArgument {
                name: "budget".to_string(),
                description: "Optional spending limit, in the shop currency".to_string(),
                required: false,
            },
            PromptArgument {
                name: "category".to_string(),
                description: "Optional category to restrict the search to".to_string(),
                required: false,
            },
        ],
        template: "You are helping a shopper find products in this storefront.\n\
                   \n\
                   The shopper is looking for: {{need}}\n\
                   {{#if budget}}\n\
                   Their budget is {{budget}}. Do not suggest products above it.\n\
                   {{/if}}\n\
                   {{#if category}}\n\
                   Restrict your search to the {{category}} category.\n\
                   {{/if}}\n\
                   \n\
                   Use the search_products tool to find candidates, then use\n\
                   get_product on the two or three strongest matches and\n\
                   summarise each in one sentence with its price."
            .to_string(),
    }
}

fn cart_review() -> PromptDescriptor {
    PromptDescriptor {
        name: "cart-review".to_string(),
        description: "Summarise a cart's contents and flag anything worth checking before \
                      checkout"
            .to_string(),
        arguments: vec![
            PromptArgument {
                name: "cart_id".to_string(),
                description: "The cart to review".to_string(),
                required: true,
            },
            PromptArgument {
                name: "concerns".to_string(),
                description: "Anything specific the shopper asked to double-check".to_string(),
                required: false,
            },
        ],
        template: "Review cart {{cart_id}} before the shopper checks out.\n\
                   \n\
                   Fetch it with get_cart and report: each line item with\n\
                   quantity and unit price, the cart total, and anything that\n\
                   looks off (duplicate lines, zero quantities, missing prices).\n\
                   {{#if concerns}}\n\
                   The shopper specifically asked about: {{concerns}}\n\
                   {{/if}}"
            .to_string(),
    }
}

fn order_support() -> PromptDescriptor {
    PromptDescriptor {
        name: "order-support".to_string(),
        description: "Answer a customer's question about an existing order".to_string(),
        arguments: vec![
            PromptArgument {
                name: "order_id".to_string(),
                description: "The order the customer is asking about".to_string(),
                required: true,
            },
            PromptArgument {
                name: "question".to_string(),
                description: "The customer's question in their own words".to_string(),
                required: true,
            },
        ],
        template: "A customer has a question about order {{order_id}}.\n\
                   \n\
                   Their question: {{question}}\n\
                   \n\
                   Fetch the order with get_order and answer from its actual\n\
                   status and line items. If the order cannot be found, say so\n\
                   plainly and suggest they verify the order number."
            .to_string(),
    }
}
