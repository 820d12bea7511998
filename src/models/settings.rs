// 采集配置数据结构

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_CONNECT_TIMEOUT, HOST_KEY_ALGORITHMS};

/// 采集设置（持久化用）
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestSettings {
    /// 依次探测的主机密钥算法
    pub algorithms: Vec<String>,
    /// 单次探测的连接/握手超时（秒）
    pub connect_timeout: u64,
}

impl Default for HarvestSettings {
    fn default() -> Self {
        Self {
            algorithms: HOST_KEY_ALGORITHMS.iter().map(|s| s.to_string()).collect(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl HarvestSettings {
    /// 用逗号分隔的算法列表覆盖默认列表
    /// 空项（多余的逗号）会被忽略
    pub fn set_algorithms_csv(&mut self, list: &str) {
        self.algorithms = parse_algorithm_list(list);
    }
}

/// 拆分逗号分隔的算法列表
pub fn parse_algorithm_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
