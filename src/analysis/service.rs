use time::OffsetDateTime;

use super::prompts::{portfolio_prompt, stock_prompt};
use crate::external::{LlmClient, LlmError};
use crate::store::{NewPortfolioAnalysis, NewStockAnalysis, PortfolioWithStocks, Stock};

/// Asks the model about one stock. Nothing is persisted here.
pub async fn analyze_stock(llm: &dyn LlmClient, stock: &Stock) -> Result<NewStockAnalysis, LlmError> {
    let analysis = llm.complete(&stock_prompt(stock)).await?;
    Ok(NewStockAnalysis {
        stock_id: stock.id,
        analysis,
        generated_at: OffsetDateTime::now_utc(),
    })
}

pub async fn analyze_portfolio(
    llm: &dyn LlmClient,
    portfolio: &PortfolioWithStocks,
) -> Result<NewPortfolioAnalysis, LlmError> {
    let analysis = llm.complete(&portfolio_prompt(portfolio)).await?;
    Ok(NewPortfolioAnalysis {
        portfolio_id: portfolio.portfolio.id,
        analysis,
        stock_count: i32::try_from(portfolio.stocks.len()).unwrap_or(i32::MAX),
        generated_at: OffsetDateTime::now_utc(),
    })
}
