//! The fixed set of holder queries we run on Dune.

use std::path::{Path, PathBuf};

use enum_iterator::{all, Sequence};
use serde::{Deserialize, Serialize};

use super::DuneError;

const BAL_MAINNET: &str = "0xba100000625a3754423978a60c9317c58a424e3D";
const BAL_POLYGON: &str = "0x9a71012B13CA4d3D0Cdc72A177DF3ef03b0E76A3";
const BVE_CVX_MAINNET: &str = "0xfd05D3C7fe2924020620A8bE4961bBaA747e6305";

const VL_CVX_HOLDERS_SQL: &str = "mainnet_vlcvx_holders.sql";
const TOKEN_BALANCES_SQL: &str = "token_balances.sql";

// Dune dataset ids, which chain a query runs against.
const DATASET_MAINNET: i64 = 4;
const DATASET_POLYGON: i64 = 7;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterType {
    Number,
    Date,
    Text,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryParameter {
    pub key: String,
    #[serde(rename = "type")]
    pub kind: ParameterType,
    pub value: String,
}

impl QueryParameter {
    fn block_number(block: u64) -> Self {
        Self {
            key: "BlockNumber".to_string(),
            kind: ParameterType::Number,
            value: block.to_string(),
        }
    }

    fn address(address: &str) -> Self {
        Self {
            key: "Address".to_string(),
            kind: ParameterType::Text,
            value: address.to_string(),
        }
    }
}

/// The outputs a run produces, in the order they are fetched.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Sequence, Serialize, Deserialize,
)]
pub enum QueryKey {
    #[serde(rename = "vlCVX")]
    VlCvx,
    #[serde(rename = "balMainnet")]
    BalMainnet,
    #[serde(rename = "balPolygon")]
    BalPolygon,
    #[serde(rename = "bveCVX")]
    BveCvx,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryDefinition {
    pub key: QueryKey,
    /// Id of the query on Dune that gets overwritten with our SQL.
    pub id: i64,
    pub sql_path: PathBuf,
    pub name: String,
    pub dataset_id: i64,
    pub parameters: Vec<QueryParameter>,
}

impl QueryDefinition {
    pub fn load_sql(&self) -> Result<String, DuneError> {
        std::fs::read_to_string(&self.sql_path).map_err(|source| DuneError::Sql {
            path: self.sql_path.clone(),
            source,
        })
    }
}

/// Blocks the holder snapshots are taken at, per chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CutoffBlocks {
    pub mainnet: u64,
    pub polygon: u64,
}

// Arbitrum BAL holders are missing, Dune doesn't index Arbitrum.
fn query_definition(key: QueryKey, cutoffs: &CutoffBlocks, sql_dir: &Path) -> QueryDefinition {
    let (id, sql_file, name, dataset_id, parameters) = match key {
        QueryKey::VlCvx => (
            855391,
            VL_CVX_HOLDERS_SQL,
            "vlCVX holders",
            DATASET_MAINNET,
            vec![QueryParameter::block_number(cutoffs.mainnet)],
        ),
        QueryKey::BalMainnet => (
            493891,
            TOKEN_BALANCES_SQL,
            "BAL holders (Mainnet)",
            DATASET_MAINNET,
            vec![
                QueryParameter::block_number(cutoffs.mainnet),
                QueryParameter::address(BAL_MAINNET),
            ],
        ),
        QueryKey::BalPolygon => (
            511724,
            TOKEN_BALANCES_SQL,
            "BAL holders (Polygon)",
            DATASET_POLYGON,
            vec![
                QueryParameter::block_number(cutoffs.polygon),
                QueryParameter::address(BAL_POLYGON),
            ],
        ),
        QueryKey::BveCvx => (
            855374,
            TOKEN_BALANCES_SQL,
            "bveCVX holders (Mainnet)",
            DATASET_MAINNET,
            vec![
                QueryParameter::block_number(cutoffs.mainnet),
                QueryParameter::address(BVE_CVX_MAINNET),
            ],
        ),
    };

    QueryDefinition {
        key,
        id,
        sql_path: sql_dir.join(sql_file),
        name: name.to_string(),
        dataset_id,
        parameters,
    }
}

pub fn dune_queries(cutoffs: &CutoffBlocks, sql_dir: &Path) -> Vec<QueryDefinition> {
    all::<QueryKey>()
        .map(|key| query_definition(key, cutoffs, sql_dir))
        .collect()
}
