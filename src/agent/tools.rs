//! Tool schema and JSON dispatch for the Optimization Agent's tool-loop
//! contract: names are part of the contract, since the host
//! language model references them by name.

use serde_json::{json, Value};

use super::OptimizationAgent;
use crate::error::{EngineError, EngineResult};

pub const TOOL_NAMES: &[&str] = &[
    "get_pending_orders",
    "get_available_shippers",
    "find_nearest_shippers",
    "process_batch_assignments",
    "rebalance_shippers",
    "get_area_transfer_queue",
    "get_hub_transfer_queue",
    "get_trucks_in_area",
    "assign_batch_to_truck",
    "optimize_hub_routing",
    "report_incident",
];

/// JSON-schema tool declarations for a `tools/list` response.
pub fn tool_schemas() -> Value {
    json!([
        {
            "name": "get_pending_orders",
            "description": "List pending orders in an area with receiver coordinates present and no legs planned yet.",
            "inputSchema": {
                "type": "object",
                "properties": { "area_id": { "type": "string" } },
                "required": ["area_id"]
            }
        },
        {
            "name": "get_available_shippers",
            "description": "List online motorbike couriers available in an area.",
            "inputSchema": {
                "type": "object",
                "properties": { "area_id": { "type": "string" } },
                "required": ["area_id"]
            }
        },
        {
            "name": "find_nearest_shippers",
            "description": "Find couriers within 15km of an order's receiver, sorted by distance.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "order_id": { "type": "string" },
                    "area_id": { "type": "string" }
                },
                "required": ["order_id", "area_id"]
            }
        },
        {
            "name": "process_batch_assignments",
            "description": "Assign a batch of (order_id, courier_id) pairs; failures on one pair do not abort the others.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "pairs": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "order_id": { "type": "string" },
                                "courier_id": { "type": "string" }
                            },
                            "required": ["order_id", "courier_id"]
                        }
                    }
                },
                "required": ["pairs"]
            }
        },
        {
            "name": "rebalance_shippers",
            "description": "Move up to 5 idle online motorbike couriers from nearby areas into an overloaded area.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "overloaded_area_id": { "type": "string" },
                    "max_km": { "type": "number" }
                },
                "required": ["overloaded_area_id"]
            }
        },
        {
            "name": "get_area_transfer_queue",
            "description": "List pending transfer legs in an area whose preceding pickup leg has completed.",
            "inputSchema": {
                "type": "object",
                "properties": { "area_id": { "type": "string" } },
                "required": ["area_id"]
            }
        },
        {
            "name": "get_hub_transfer_queue",
            "description": "Get the next ready transfer leg departing a specific hub.",
            "inputSchema": {
                "type": "object",
                "properties": { "hub_id": { "type": "string" } },
                "required": ["hub_id"]
            }
        },
        {
            "name": "get_trucks_in_area",
            "description": "List truck couriers assigned to an area.",
            "inputSchema": {
                "type": "object",
                "properties": { "area_id": { "type": "string" } },
                "required": ["area_id"]
            }
        },
        {
            "name": "assign_batch_to_truck",
            "description": "Attach a truck courier to a batch of transfer legs.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "truck_courier_id": { "type": "string" },
                    "leg_ids": { "type": "array", "items": { "type": "string" } }
                },
                "required": ["truck_courier_id", "leg_ids"]
            }
        },
        {
            "name": "optimize_hub_routing",
            "description": "Group a hub's ready transfer legs by destination satellite (planning only, no mutation).",
            "inputSchema": {
                "type": "object",
                "properties": { "hub_id": { "type": "string" } },
                "required": ["hub_id"]
            }
        },
        {
            "name": "report_incident",
            "description": "Report a courier incident; reassigns in-flight legs to the nearest available rescuer.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "courier_id": { "type": "string" },
                    "description": { "type": "string" },
                    "latitude": { "type": "number" },
                    "longitude": { "type": "number" }
                },
                "required": ["courier_id", "description", "latitude", "longitude"]
            }
        },
    ])
}

fn arg_str<'a>(args: &'a Value, key: &str) -> EngineResult<&'a str> {
    args.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| EngineError::ValidationError(format!("missing or non-string argument: {key}")))
}

fn arg_f64(args: &Value, key: &str) -> EngineResult<f64> {
    args.get(key)
        .and_then(|v| v.as_f64())
        .ok_or_else(|| EngineError::ValidationError(format!("missing or non-numeric argument: {key}")))
}

/// Dispatches a `tools/call` by name, validating the name and routing to
/// the corresponding pure method.
pub async fn dispatch_tool(agent: &OptimizationAgent, name: &str, args: &Value) -> EngineResult<Value> {
    if !TOOL_NAMES.contains(&name) {
        return Err(EngineError::ValidationError(format!("unknown tool: {name}")));
    }
    match name {
        "get_pending_orders" => {
            let area_id = arg_str(args, "area_id")?;
            let orders = agent.get_pending_orders(area_id).await?;
            if orders.is_empty() {
                return Ok(json!("SKIP_PHASE_1: no pending orders with coordinates"));
            }
            Ok(json!(orders))
        }
        "get_available_shippers" => {
            let area_id = arg_str(args, "area_id")?;
            Ok(json!(agent.get_available_couriers(area_id).await?))
        }
        "find_nearest_shippers" => {
            let area_id = arg_str(args, "area_id")?;
            let order_id = arg_str(args, "order_id")?;
            let order = agent.journeys.get_order(order_id).await?;
            let couriers = agent.get_available_couriers(area_id).await?;
            let area = agent.areas.get(area_id).await?;
            let nearest = agent.find_nearest_couriers(&order, &couriers, (area.center_lat, area.center_lon));
            Ok(json!(nearest
                .into_iter()
                .map(|(c, d)| json!({ "courier_id": c.courier_id, "distance_km": d }))
                .collect::<Vec<_>>()))
        }
        "process_batch_assignments" => {
            let pairs_arg = args
                .get("pairs")
                .and_then(|v| v.as_array())
                .ok_or_else(|| EngineError::ValidationError("missing pairs argument".into()))?;
            let mut pairs = Vec::with_capacity(pairs_arg.len());
            for pair in pairs_arg {
                let order_id = arg_str(pair, "order_id")?.to_string();
                let courier_id = arg_str(pair, "courier_id")?.to_string();
                pairs.push((order_id, courier_id));
            }
            let hubs = agent
                .warehouses
                .list_active_by_type(crate::models::WarehouseType::Hub)
                .await?;
            let satellites = agent
                .warehouses
                .list_active_by_type(crate::models::WarehouseType::Satellite)
                .await?;
            let results = agent.dispatcher.batch_assign(pairs, &hubs, &satellites).await;
            Ok(json!(results
                .into_iter()
                .map(|(order_id, outcome)| match outcome {
                    Ok(legs) => json!({ "order_id": order_id, "success": true, "leg_count": legs.len() }),
                    Err(err) => json!({ "order_id": order_id, "success": false, "error": err.to_string() }),
                })
                .collect::<Vec<_>>()))
        }
        "rebalance_shippers" => {
            let overloaded_area_id = arg_str(args, "overloaded_area_id")?;
            let max_km = args
                .get("max_km")
                .and_then(|v| v.as_f64())
                .unwrap_or(50.0);
            Ok(json!(agent.rebalance_couriers(overloaded_area_id, max_km).await?))
        }
        "get_area_transfer_queue" => {
            let area_id = arg_str(args, "area_id")?;
            Ok(json!(agent.get_area_transfer_queue(area_id).await?))
        }
        "get_hub_transfer_queue" => {
            let hub_id = arg_str(args, "hub_id")?;
            Ok(json!(agent.get_hub_transfer_queue(hub_id).await?))
        }
        "get_trucks_in_area" => {
            let area_id = arg_str(args, "area_id")?;
            Ok(json!(agent.get_trucks_in_area(area_id).await?))
        }
        "assign_batch_to_truck" => {
            let truck_courier_id = arg_str(args, "truck_courier_id")?;
            let leg_ids: Vec<String> = args
                .get("leg_ids")
                .and_then(|v| v.as_array())
                .map(|items| items.iter().filter_map(|v| v.as_str().map(String::from)).collect())
                .unwrap_or_default();
            let assigned = agent.assign_batch_to_truck(truck_courier_id, &leg_ids).await?;
            Ok(json!({ "assigned": assigned }))
        }
        "optimize_hub_routing" => {
            let hub_id = arg_str(args, "hub_id")?;
            Ok(json!(agent.optimize_hub_routing(hub_id).await?))
        }
        "report_incident" => {
            let courier_id = arg_str(args, "courier_id")?;
            let description = arg_str(args, "description")?;
            let lat = arg_f64(args, "latitude")?;
            let lon = arg_f64(args, "longitude")?;
            Ok(json!(agent.report_incident(courier_id, description, lat, lon).await?))
        }
        _ => unreachable!("checked by TOOL_NAMES above"),
    }
}
