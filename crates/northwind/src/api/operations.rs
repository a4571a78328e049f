use super::domain::{Entity, Product};
use crate::model::{
    OperationBinding, OperationDescriptor, OperationKind, OperationParameter, PropertyKind,
};

pub const INCREASE_PRICE: &str = "IncreasePrice";
pub const RESET_DATA_SOURCE: &str = "ResetDataSource";
pub const MOST_EXPENSIVE: &str = "MostExpensive";

/// Operation bodies reject inputs that would leave a product in an invalid state.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OperationError {
    #[error("product {0} has no unit price to adjust")]
    MissingPrice(i32),
    #[error("product {product_id} price would drop below zero ({price})")]
    NegativePrice { product_id: i32, price: f64 },
}

/// Adds `diff` to the product's unit price in place.
pub fn increase_price(product: &mut Product, diff: i32) -> Result<f64, OperationError> {
    let current = product
        .unit_price
        .ok_or(OperationError::MissingPrice(product.product_id))?;
    let updated = current + f64::from(diff);
    if updated < 0.0 {
        return Err(OperationError::NegativePrice {
            product_id: product.product_id,
            price: updated,
        });
    }

    product.unit_price = Some(updated);
    Ok(updated)
}

/// Highest unit price across `products`; `None` when no product is priced.
pub fn most_expensive<'a, I>(products: I) -> Option<f64>
where
    I: IntoIterator<Item = &'a Product>,
{
    products
        .into_iter()
        .filter_map(|product| product.unit_price)
        .fold(None, |max, price| match max {
            Some(current) if current >= price => Some(current),
            _ => Some(price),
        })
}

/// Operation descriptors published in the model.
pub fn descriptors() -> Vec<OperationDescriptor> {
    vec![
        OperationDescriptor {
            name: INCREASE_PRICE.to_string(),
            kind: OperationKind::Action,
            has_side_effects: true,
            binding: Some(OperationBinding {
                entity_type: Product::TYPE_NAME.to_string(),
                collection: false,
            }),
            parameters: vec![OperationParameter {
                name: "diff".to_string(),
                kind: PropertyKind::Int32,
            }],
            return_type: None,
        },
        OperationDescriptor {
            name: RESET_DATA_SOURCE.to_string(),
            kind: OperationKind::Action,
            has_side_effects: true,
            binding: None,
            parameters: Vec::new(),
            return_type: None,
        },
        OperationDescriptor {
            name: MOST_EXPENSIVE.to_string(),
            kind: OperationKind::Function,
            has_side_effects: false,
            binding: Some(OperationBinding {
                entity_type: Product::TYPE_NAME.to_string(),
                collection: true,
            }),
            parameters: Vec::new(),
            return_type: Some(PropertyKind::Double),
        },
    ]
}
