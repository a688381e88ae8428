//! Fixed extraction prompts, one per client page.

use crate::types::CommandKind;

pub trait QueryPrompt: Send + Sync {
    fn name(&self) -> &str;
    fn prompt(&self) -> &str;
}

pub struct AssetPrompt;

impl QueryPrompt for AssetPrompt {
    fn name(&self) -> &str {
        "assets"
    }

    fn prompt(&self) -> &str {
        r#"请仔细分析这张股票交易软件的资产查询页面截图，提取所有资产相关信息。

请以 JSON 格式返回数据，包含以下字段：
1. total_assets: 总资产（字符串，如 "100000.00"）
2. available_cash: 可用资金/可用余额（字符串）
3. market_value: 总市值（字符串）
4. frozen_amount: 冻结资金（字符串，如果有）
5. stocks: 持仓股票列表（数组），每个股票包含：
   - code: 股票代码（字符串，如 "000001"）
   - name: 股票名称（字符串，如 "平安银行"）
   - quantity: 持仓数量（字符串，如 "1000"）
   - cost_price: 成本价（字符串，如 "10.50"）
   - current_price: 当前价/现价（字符串，如 "11.20"）
   - market_value: 市值（字符串，如 "11200.00"）
   - profit_loss: 盈亏金额（字符串，如 "+700.00" 或 "-200.00"）
   - profit_loss_rate: 盈亏比例（字符串，如 "+6.67%" 或 "-1.90%"）

要求：
- 如果某个字段在截图中找不到，请设置为空字符串 "" 或空数组 []
- 所有数字字段都保持为字符串格式，不要转换为数字
- 如果截图中没有显示资产信息或页面未加载完成，返回空数据

请直接返回 JSON 格式，不要包含其他说明文字。"#
    }
}

pub struct PositionsPrompt;

impl QueryPrompt for PositionsPrompt {
    fn name(&self) -> &str {
        "positions"
    }

    fn prompt(&self) -> &str {
        r#"这是股票交易软件的持仓页面截图。请提取持仓表格中的每一行。

返回 JSON：
{
  "positions": [
    {"code": "", "name": "", "quantity": "", "available_quantity": "", "cost_price": "", "current_price": "", "market_value": "", "profit_loss": "", "profit_loss_rate": ""}
  ]
}

所有数字保持为字符串；找不到的字段置为 ""；没有持仓时返回 {"positions": []}。
只返回 JSON，不要包含其他说明文字。"#
    }
}

pub struct TradesPrompt;

impl QueryPrompt for TradesPrompt {
    fn name(&self) -> &str {
        "trades"
    }

    fn prompt(&self) -> &str {
        r#"这是股票交易软件的当日成交页面截图。请提取成交表格中的每一行。

返回 JSON：
{
  "trades": [
    {"time": "", "code": "", "name": "", "side": "买入|卖出", "price": "", "quantity": "", "amount": "", "trade_id": "", "order_id": ""}
  ]
}

所有数字保持为字符串；找不到的字段置为 ""；没有成交时返回 {"trades": []}。
只返回 JSON，不要包含其他说明文字。"#
    }
}

pub struct OrdersPrompt;

impl QueryPrompt for OrdersPrompt {
    fn name(&self) -> &str {
        "orders"
    }

    fn prompt(&self) -> &str {
        r#"这是股票交易软件的当日委托页面截图。请提取委托表格中的每一行。

返回 JSON：
{
  "orders": [
    {"time": "", "order_id": "", "code": "", "name": "", "side": "买入|卖出", "price": "", "quantity": "", "filled_quantity": "", "status": ""}
  ]
}

所有数字保持为字符串；找不到的字段置为 ""；没有委托时返回 {"orders": []}。
只返回 JSON，不要包含其他说明文字。"#
    }
}

/// Reads the dialog shown after submitting an order or cancel.
pub struct ConfirmationPrompt;

impl QueryPrompt for ConfirmationPrompt {
    fn name(&self) -> &str {
        "confirmation"
    }

    fn prompt(&self) -> &str {
        r#"这是股票交易软件提交委托或撤单后的截图。请判断是否出现了错误或拒绝提示（例如"资金不足"、"超出涨跌停"、"非交易时间"、"委托失败"等弹窗）。

返回 JSON：
{"accepted": true 或 false, "message": "截图中提示框的原文，没有提示框时为空字符串"}

只返回 JSON，不要包含其他说明文字。"#
    }
}

static ASSETS: AssetPrompt = AssetPrompt;
static POSITIONS: PositionsPrompt = PositionsPrompt;
static TRADES: TradesPrompt = TradesPrompt;
static ORDERS: OrdersPrompt = OrdersPrompt;
static CONFIRMATION: ConfirmationPrompt = ConfirmationPrompt;

/// Prompt used to interpret the page captured by a query command.
pub fn for_query(kind: CommandKind) -> Option<&'static dyn QueryPrompt> {
    match kind {
        CommandKind::QueryAssets => Some(&ASSETS),
        CommandKind::QueryPositions => Some(&POSITIONS),
        CommandKind::QueryTrades => Some(&TRADES),
        CommandKind::QueryOrders => Some(&ORDERS),
        _ => None,
    }
}

pub fn confirmation() -> &'static dyn QueryPrompt {
    &CONFIRMATION
}
